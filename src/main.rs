use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use scrollstitch::paginate::compose_page;
use scrollstitch::{
    capture_page, paginate_segments, plan_capture, CancelFlag, CaptureConfig, CaptureSource,
    DirStore, PageFormat, PageGeometry, PagePlacement, PageSpec, RasterLimits,
};

#[derive(Parser)]
#[command(
    name = "scrollstitch",
    version,
    about = "Stitch scrolled viewport captures and paginate the result"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the capture strategy and segments for a page as JSON
    Plan {
        #[arg(long)]
        total_height: u32,
        #[arg(long)]
        viewport_width: u32,
        #[arg(long)]
        viewport_height: u32,
        #[arg(long, default_value_t = 1.0)]
        dpr: f64,
        #[arg(long)]
        max_dimension: Option<u32>,
        #[arg(long)]
        max_area: Option<u64>,
    },
    /// Stitch viewport captures (VIEWPORT.png:OFFSET) into segments on disk
    Stitch {
        /// Segment store directory
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        capture_id: Option<String>,
        #[arg(long)]
        total_height: u32,
        /// Device pixel ratio the captures were taken at
        #[arg(long, default_value_t = 1.0)]
        dpr: f64,
        /// JSON file with a capture configuration
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// Cut rasters into pages and render them as PNGs
    Paginate {
        #[arg(long, default_value = "a4")]
        format: String,
        #[arg(long)]
        landscape: bool,
        #[arg(long)]
        margin_mm: Option<f64>,
        /// Footer line; `{page}` and `{pages}` are filled in. Repeatable.
        #[arg(long)]
        footer: Vec<String>,
        #[arg(long, default_value_t = 150.0)]
        dpi: f64,
        #[arg(long)]
        out: PathBuf,
        #[arg(required = true)]
        rasters: Vec<PathBuf>,
    },
}

/// Viewport captures already on disk, keyed by scroll offset
struct FileSource {
    frames: BTreeMap<u32, PathBuf>,
    geometry: PageGeometry,
    current: u32,
}

impl CaptureSource for FileSource {
    fn geometry(&mut self) -> scrollstitch::Result<PageGeometry> {
        Ok(self.geometry)
    }

    fn scroll_to(&mut self, y: u32) -> scrollstitch::Result<()> {
        if !self.frames.contains_key(&y) {
            return Err(scrollstitch::Error::Capture(format!(
                "no viewport capture for offset {}",
                y
            )));
        }
        self.current = y;
        Ok(())
    }

    fn capture_viewport(&mut self) -> scrollstitch::Result<image::RgbaImage> {
        let path = self
            .frames
            .get(&self.current)
            .ok_or_else(|| {
                scrollstitch::Error::Capture(format!(
                    "no viewport capture for offset {}",
                    self.current
                ))
            })?;
        Ok(image::open(path)?.to_rgba8())
    }
}

fn parse_input(arg: &str) -> anyhow::Result<(PathBuf, u32)> {
    let (path, offset) = arg
        .rsplit_once(':')
        .with_context(|| format!("expected VIEWPORT.png:OFFSET, got '{}'", arg))?;
    let offset = offset
        .parse::<u32>()
        .with_context(|| format!("invalid offset in '{}'", arg))?;
    Ok((PathBuf::from(path), offset))
}

fn write_json(path: &Path, value: &impl Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn run_plan(geometry: PageGeometry, limits: RasterLimits) -> anyhow::Result<()> {
    let (strategy, segments) = plan_capture(&geometry, &limits).context("planning capture")?;

    #[derive(Serialize)]
    struct Plan<'a> {
        strategy: scrollstitch::CaptureStrategy,
        segments: &'a [scrollstitch::Segment],
    }
    let plan = Plan {
        strategy,
        segments: &segments,
    };
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run_stitch(
    out: PathBuf,
    capture_id: Option<String>,
    total_height: u32,
    dpr: f64,
    config: Option<PathBuf>,
    inputs: Vec<String>,
) -> anyhow::Result<()> {
    let mut config: CaptureConfig = match config {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => CaptureConfig {
            scroll_settle_ms: 0,
            min_capture_interval_ms: 0,
            ..Default::default()
        },
    };
    if let Some(id) = capture_id {
        config.capture_id = id;
    }

    let mut frames = BTreeMap::new();
    for arg in &inputs {
        let (path, offset) = parse_input(arg)?;
        frames.insert(offset, path);
    }
    let first = frames.values().next().context("no viewport captures given")?;
    let (w, h) = image::image_dimensions(first)
        .with_context(|| format!("reading {}", first.display()))?;
    if !(dpr > 0.0) {
        bail!("dpr must be positive, got {}", dpr);
    }
    let geometry = PageGeometry {
        total_height,
        viewport_width: (w as f64 / dpr).round() as u32,
        viewport_height: (h as f64 / dpr).round() as u32,
        device_pixel_ratio: dpr,
    };

    let store = DirStore::open(&out).with_context(|| format!("opening store {}", out.display()))?;
    let source = FileSource {
        frames,
        geometry,
        current: 0,
    };

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    let outcome = runtime
        .block_on(capture_page(source, &store, &config, CancelFlag::new()))
        .context("stitching captures")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    eprintln!(
        "Stored {} segment(s) under {}",
        outcome.segments.len(),
        store.root().join(&outcome.capture_id).display()
    );
    Ok(())
}

fn run_paginate(
    spec: PageSpec,
    dpi: f64,
    out: PathBuf,
    rasters: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut images = Vec::with_capacity(rasters.len());
    for path in &rasters {
        let img = image::open(path).with_context(|| format!("reading {}", path.display()))?;
        images.push(img.to_rgba8());
    }

    let placements: Vec<PagePlacement> = paginate_segments(&images, &spec).context("paginating")?;
    fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;

    for placement in &placements {
        let raster = &images[placement.segment_index];
        let page = compose_page(raster, placement, dpi)
            .with_context(|| format!("composing page {}", placement.page_number))?;
        let path = out.join(format!("page-{:03}.png", placement.page_number));
        page.save(&path).with_context(|| format!("writing {}", path.display()))?;
    }
    write_json(&out.join("pages.json"), &placements)?;

    println!("Wrote {} page(s) to {}", placements.len(), out.display());
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan {
            total_height,
            viewport_width,
            viewport_height,
            dpr,
            max_dimension,
            max_area,
        } => {
            let defaults = RasterLimits::default();
            let limits = RasterLimits {
                max_dimension: max_dimension.unwrap_or(defaults.max_dimension),
                max_area: max_area.unwrap_or(defaults.max_area),
            };
            let geometry = PageGeometry {
                total_height,
                viewport_width,
                viewport_height,
                device_pixel_ratio: dpr,
            };
            run_plan(geometry, limits)
        }
        Command::Stitch {
            out,
            capture_id,
            total_height,
            dpr,
            config,
            inputs,
        } => run_stitch(out, capture_id, total_height, dpr, config, inputs),
        Command::Paginate {
            format,
            landscape,
            margin_mm,
            footer,
            dpi,
            out,
            rasters,
        } => {
            let format: PageFormat = format.parse().context("parsing --format")?;
            let defaults = PageSpec::default();
            let spec = PageSpec {
                format,
                landscape,
                margin_mm: margin_mm.unwrap_or(defaults.margin_mm),
                footer_lines: footer,
            };
            run_paginate(spec, dpi, out, rasters)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("scrollstitch failed: {:#}", e);
        std::process::exit(1);
    }
}
