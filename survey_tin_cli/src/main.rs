use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::process;
use std::time::Duration;
use survey_tin::{
    build_surface, densify_with,
    point_cloud::{spacing_statistics, TYPE_KEY},
    BreaklineMode, Cancellation, InterpolationMethod, Point3, PointCloud, Polyline, ProjectSettings,
};

#[derive(Parser)]
#[command(version, about = "Terrain surface tools for survey points")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a TIN from an x,y,z point file and report its statistics.
    Tin {
        input: String,
        /// Breakline file: x,y,z rows, polylines separated by blank lines.
        #[arg(long)]
        breaklines: Option<String>,
        /// Drop triangles with an edge longer than this.
        #[arg(long)]
        max_edge_length: Option<f64>,
        /// Insert breaklines as forced edges instead of rejecting triangles.
        #[arg(long)]
        constrained: bool,
    },
    /// Add interpolated points to sparse parts of the surface.
    Densify {
        input: String,
        output: String,
        /// JSON settings file.
        #[arg(long)]
        config: Option<String>,
        #[arg(long)]
        breaklines: Option<String>,
        #[arg(long)]
        grid_spacing: Option<f64>,
        /// linear, cubic or nearest.
        #[arg(long)]
        method: Option<InterpolationMethod>,
        #[arg(long)]
        max_points: Option<u64>,
        /// Longest triangle edge above which a triangle is densified.
        #[arg(long)]
        threshold: Option<f64>,
        /// Give up on grid generation after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print nearest-neighbour spacing statistics.
    Spacing { input: String },
}

fn parse_row(line: &str, idx: usize) -> io::Result<Point3> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 3 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line {}: expected three comma-separated values", idx + 1),
        ));
    }
    let mut coords = [0.0; 3];
    for (c, raw) in coords.iter_mut().zip(&parts[..3]) {
        *c = raw.trim().parse::<f64>().map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("line {}: {}", idx + 1, e))
        })?;
    }
    Ok(Point3::new(coords[0], coords[1], coords[2]))
}

fn read_points(path: &str) -> io::Result<Vec<Point3>> {
    let text = fs::read_to_string(path)?;
    let mut pts = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        pts.push(parse_row(line, idx)?);
    }
    Ok(pts)
}

fn read_breaklines(path: &str) -> io::Result<Vec<Polyline>> {
    let text = fs::read_to_string(path)?;
    let mut lines = Vec::new();
    let mut current = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            if current.len() >= 2 {
                lines.push(Polyline::new(std::mem::take(&mut current), "breakline"));
            }
            current.clear();
            continue;
        }
        current.push(parse_row(line, idx)?);
    }
    if current.len() >= 2 {
        lines.push(Polyline::new(current, "breakline"));
    }
    Ok(lines)
}

fn write_cloud(path: &str, cloud: &PointCloud) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    for (p, meta) in cloud.points().iter().zip(cloud.metadata()) {
        let kind = meta
            .get(TYPE_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or("original");
        writeln!(file, "{},{},{},{}", p.x, p.y, p.z, kind)?;
    }
    Ok(())
}

fn load_breaklines(path: Option<&str>) -> Vec<Polyline> {
    match path {
        Some(path) => match read_breaklines(path) {
            Ok(lines) => lines,
            Err(e) => fail(format!("Error reading {}: {}", path, e)),
        },
        None => Vec::new(),
    }
}

fn fail(msg: String) -> ! {
    eprintln!("{msg}");
    process::exit(1)
}

fn main() {
    env_logger::Builder::from_default_env().init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Tin {
            input,
            breaklines,
            max_edge_length,
            constrained,
        } => {
            let pts = read_points(&input)
                .unwrap_or_else(|e| fail(format!("Error reading {}: {}", input, e)));
            let lines = load_breaklines(breaklines.as_deref());
            let mut settings = ProjectSettings::default().tin;
            settings.max_edge_length = max_edge_length;
            if constrained {
                settings.breakline_mode = BreaklineMode::Constrained;
            }
            match build_surface(&PointCloud::from_points(pts), &lines, &settings) {
                Ok((tin, stats)) => {
                    println!("Triangles: {}", tin.triangle_count());
                    println!("Quality: {:.3}", tin.quality());
                    if !lines.is_empty() {
                        println!("Breaklines: {}", stats.breakline_count);
                    }
                    if let Some(err) = stats.error {
                        println!("Warning: {}", err);
                    }
                }
                Err(e) => fail(format!("Error: {}", e)),
            }
        }
        Commands::Densify {
            input,
            output,
            config,
            breaklines,
            grid_spacing,
            method,
            max_points,
            threshold,
            timeout_ms,
        } => {
            let mut settings = match config {
                Some(path) => ProjectSettings::from_json(&path)
                    .unwrap_or_else(|e| fail(format!("Error reading {}: {}", path, e))),
                None => ProjectSettings::default(),
            };
            let dens = &mut settings.densification;
            dens.enabled = true;
            if let Some(v) = grid_spacing {
                dens.grid_spacing = v;
            }
            if let Some(m) = method {
                dens.interpolation_method = m;
            }
            if let Some(v) = max_points {
                dens.max_points = v;
            }
            if let Some(v) = threshold {
                dens.min_spacing_threshold = v;
            }

            let pts = read_points(&input)
                .unwrap_or_else(|e| fail(format!("Error reading {}: {}", input, e)));
            let cloud = PointCloud::from_points(pts);
            let lines = load_breaklines(breaklines.as_deref());
            let (tin, _) = build_surface(&cloud, &lines, &settings.tin)
                .unwrap_or_else(|e| fail(format!("Error: {}", e)));
            let cancel = match timeout_ms {
                Some(ms) => Cancellation::none().with_timeout(Duration::from_millis(ms)),
                None => Cancellation::none(),
            };
            let (result, stats) = densify_with(&cloud, &tin, &settings.densification, &cancel)
                .unwrap_or_else(|e| fail(format!("Error: {}", e)));
            if let Some(reason) = &stats.reason {
                println!("Skipped: {}", reason);
            }
            if let Err(e) = write_cloud(&output, &result) {
                fail(format!("Error writing {}: {}", output, e));
            }
            println!("Sparse regions: {}", stats.sparse_regions_found);
            println!("Generated {} points", stats.generated_points);
            if stats.limited_by_max {
                println!("Limited by max points");
            }
        }
        Commands::Spacing { input } => match read_points(&input) {
            Ok(pts) => {
                let s = spacing_statistics(&PointCloud::from_points(pts));
                println!("Mean spacing: {:.3}", s.mean_spacing);
                println!("Min spacing: {:.3}", s.min_spacing);
                println!("Max spacing: {:.3}", s.max_spacing);
                println!("Median spacing: {:.3}", s.median_spacing);
            }
            Err(e) => fail(format!("Error reading {}: {}", input, e)),
        },
    }
}
