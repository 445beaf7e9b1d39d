//! Batch entry point: parses a TOML config, loads frame data from files
//! named by the configured prefix/suffix/indices, runs the tracer, and
//! writes the final-positions file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use flowmap_core::device::cpu::CpuComputeDevice;
use flowmap_core::error::FlowMapError;
use flowmap_core::mesh::{Frame, FrameSource, Mesh, Tetrahedron};
use flowmap_core::{Configuration, Tracer};
use glam::DVec3;
use tracing::{error, info};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "flowmap-cli", version, about = "Batch flow map tracer")]
struct Args {
    /// Path to the TOML run configuration.
    #[arg(long = "config")]
    config: PathBuf,
    /// Path to write the final-positions file to.
    #[arg(long = "output")]
    output: PathBuf,
    /// Optional path to write the debug seed-location dump to.
    #[arg(long = "debug-dump")]
    debug_dump: Option<PathBuf>,
}

fn configure_logging() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    if result.is_err() {
        // Global subscriber already installed (e.g. under a test harness).
    }
}

/// Per-frame-file record: mesh topology and vertex positions are only
/// meaningful on frame 0, since the mesh is immutable across a run; every
/// frame's file still repeats them so each file is self-contained.
///
/// Format, one whitespace-separated token stream:
/// ```text
/// <num_cells> <num_vertices>
/// <num_cells> lines: c0 c1 c2 c3 l0 l1 l2 l3
/// <num_vertices> lines: x y z
/// <num_vertices> lines: vx vy vz
/// ```
struct FileFrameSource {
    config: Configuration,
}

impl FileFrameSource {
    fn new(config: Configuration) -> Self {
        Self { config }
    }

    fn frame_path(&self, index: usize) -> PathBuf {
        Path::new(&self.config.frame_file_name(index)).to_path_buf()
    }

    fn read_tokens(path: &Path) -> Result<Vec<String>, FlowMapError> {
        let text = fs::read_to_string(path)?;
        Ok(text.split_whitespace().map(str::to_owned).collect())
    }
}

impl FrameSource for FileFrameSource {
    fn load_mesh(&mut self) -> flowmap_core::Result<Mesh> {
        let path = self.frame_path(0);
        let tokens = Self::read_tokens(&path)?;
        let mut it = tokens.iter();
        let mut next_usize = || -> flowmap_core::Result<usize> {
            it.next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| FlowMapError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed frame header")))
        };
        let num_cells = next_usize()?;
        let num_vertices = next_usize()?;

        let mut next_i32 = || -> flowmap_core::Result<i32> {
            it.next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| FlowMapError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed cell record")))
        };
        let mut cells = Vec::with_capacity(num_cells);
        for _ in 0..num_cells {
            let connectivity = [next_i32()? as u32, next_i32()? as u32, next_i32()? as u32, next_i32()? as u32];
            let links = [next_i32()?, next_i32()?, next_i32()?, next_i32()?];
            cells.push(Tetrahedron { connectivity, links });
        }

        let mut next_f64 = || -> flowmap_core::Result<f64> {
            it.next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| FlowMapError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed vertex record")))
        };
        let mut vertices = Vec::with_capacity(num_vertices);
        for _ in 0..num_vertices {
            vertices.push(DVec3::new(next_f64()?, next_f64()?, next_f64()?));
        }

        Ok(Mesh { cells, vertices })
    }

    fn load_frame(&mut self, index: usize) -> flowmap_core::Result<Frame> {
        let path = self.frame_path(index);
        let tokens = Self::read_tokens(&path)?;
        let mut it = tokens.iter();
        let malformed = || FlowMapError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed frame file"));
        let num_cells: usize = it.next().and_then(|s| s.parse().ok()).ok_or_else(malformed)?;
        let num_vertices: usize = it.next().and_then(|s| s.parse().ok()).ok_or_else(malformed)?;

        // Skip the topology block (8 tokens per cell) and the vertex
        // position block (3 tokens per vertex) to reach the velocities.
        for _ in 0..(num_cells * 8 + num_vertices * 3) {
            it.next().ok_or_else(malformed)?;
        }

        let mut next_f64 = || -> flowmap_core::Result<f64> { it.next().and_then(|s| s.parse().ok()).ok_or_else(malformed) };
        let mut velocities = Vec::with_capacity(num_vertices);
        for _ in 0..num_vertices {
            velocities.push(DVec3::new(next_f64()?, next_f64()?, next_f64()?));
        }

        let time = self.config.time_points[index];
        Ok(Frame { time, velocities })
    }
}

fn run(args: &Args) -> Result<()> {
    let config_text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading config file {}", args.config.display()))?;
    let config = Configuration::from_toml_str(&config_text).context("parsing configuration")?;

    let mut frames = FileFrameSource::new(config.clone());
    let mut device = CpuComputeDevice::new();

    let output = Tracer::run(&mut device, &mut frames, &config).context("running tracer")?;

    let out_file = fs::File::create(&args.output)
        .with_context(|| format!("creating output file {}", args.output.display()))?;
    let mut writer = BufWriter::new(out_file);
    flowmap_core::output::write_final_positions(&output.seed_locations, &output.final_positions, &mut writer)
        .context("writing final positions")?;
    writer.flush()?;

    if let Some(debug_path) = &args.debug_dump {
        let debug_file = fs::File::create(debug_path)
            .with_context(|| format!("creating debug dump file {}", debug_path.display()))?;
        let mut debug_writer = BufWriter::new(debug_file);
        flowmap_core::seed_locator::write_debug_dump(&output.seed_locations, &mut debug_writer)
            .context("writing debug seed-location dump")?;
        debug_writer.flush()?;
    }

    info!(
        seeds = output.seed_locations.len(),
        located = output.final_positions.len(),
        output = %args.output.display(),
        "run complete"
    );
    Ok(())
}

fn main() {
    configure_logging();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        error!(target: "runtime", %err, "run failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
