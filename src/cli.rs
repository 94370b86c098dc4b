// ============================================================================
// Filterscope CLI: inspect the filter catalog and render previews headlessly
// ============================================================================
//
// Usage examples:
//   filterscope list
//   filterscope describe TwirlDistortion
//   filterscope render --filter GaussianBlur --set inputRadius=25 -i photo.png -o out.png
//   filterscope render --filter Vignette -i "shots/*.jpg" --output-dir out/ --format png
//   filterscope render --preset look.fsp -i photo.png --save-preset look2.fsp
//   filterscope session -i photo.png -o live.png        (commands on stdin)
//
// Every render goes through a real preview session: edits are queued on the
// display lane, coalesced, rendered on the worker lane and fitted into the
// preview frame.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use image::RgbaImage;

use crate::assets::AssetLibrary;
use crate::filter::{
    BuiltinCatalog, FilterCatalog, FilterParams, FilterRequest, FilterSchema, INPUT_IMAGE_KEY,
    ImageRef, ParamValue, parse_assignment,
};
use crate::io::{SaveFormat, encode_and_write, load_image_sync, load_preset, save_preset};
use crate::preview::{FrameFileSink, PreviewSession, RenderCoalescer};
use crate::render::CpuRenderEngine;
use crate::settings::PreviewSettings;
use crate::logger;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Filterscope live filter preview.
#[derive(Parser, Debug)]
#[command(
    name = "filterscope",
    version,
    about = "Coalesced live preview of image filters",
    long_about = "Browse the built-in filter catalog, render filters over images into the\n\
                  fixed preview frame, and drive an interactive preview session from stdin.\n\n\
                  Example:\n  \
                  filterscope render --filter GaussianBlur --set inputRadius=25 -i photo.png -o out.png\n  \
                  filterscope session -i photo.png -o live.png"
)]
pub struct CliArgs {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Echo log lines on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the available filters grouped by category.
    List,
    /// Show a filter's inputs with their class, default and slider range.
    Describe {
        /// Filter name, e.g. GaussianBlur.
        filter: String,
    },
    /// Render a filter over one or more images.
    Render(RenderArgs),
    /// Interactive preview session reading commands from stdin.
    ///
    /// Commands: `filter NAME`, `set KEY VALUE`, `save PATH`, `quit`.
    Session(SessionArgs),
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Filter to apply.  Optional when --preset names one.
    #[arg(long, value_name = "NAME")]
    pub filter: Option<String>,

    /// Parameter edit, repeatable: `inputRadius=20`, `inputCenter=100,80`,
    /// `inputBackgroundImage=@rings`.
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Input image(s). Glob patterns accepted.  Without inputs the default
    /// asset is rendered.
    #[arg(short, long, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga.  Inferred from --output when
    /// omitted, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Start from a saved preset (.fsp).
    #[arg(long, value_name = "FILE")]
    pub preset: Option<PathBuf>,

    /// Save the resulting filter and parameters as a preset.
    #[arg(long, value_name = "FILE")]
    pub save_preset: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Image fed to the filter; defaults to the configured asset.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// File rewritten with every presented frame.
    #[arg(short, long, value_name = "FILE", default_value = "preview.png")]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,
}

// ============================================================================
// Public entry point
// ============================================================================

struct Context {
    settings: PreviewSettings,
    catalog: Arc<BuiltinCatalog>,
    assets: AssetLibrary,
}

impl Context {
    fn load(config: Option<&Path>) -> Self {
        let settings = match config {
            Some(path) => PreviewSettings::load_from(path),
            None => PreviewSettings::load(),
        };
        let mut assets = AssetLibrary::builtin(settings.frame_size);
        if let Some(dir) = &settings.asset_dir {
            assets.load_dir(dir);
        }
        Self {
            settings,
            catalog: Arc::new(BuiltinCatalog::new()),
            assets,
        }
    }

    fn catalog(&self) -> Arc<dyn FilterCatalog> {
        self.catalog.clone()
    }

    fn default_image(&self) -> ImageRef {
        self.assets.default_image(&self.settings.default_asset)
    }

    /// Fresh coalescer + engine pair for one preview session.
    fn session<S: crate::preview::DisplaySink>(
        &self,
        sink: S,
    ) -> Result<PreviewSession<S>, String> {
        let coalescer = RenderCoalescer::new(self.catalog(), self.default_image());
        let engine = CpuRenderEngine::new(self.catalog(), self.settings.frame_spec());
        PreviewSession::new(coalescer, Arc::new(engine), sink).map_err(|e| e.to_string())
    }
}

/// Run the selected subcommand and return an OS exit code.
/// `0` = success, `1` = one or more failures.
pub fn run(args: CliArgs) -> ExitCode {
    let ctx = Context::load(args.config.as_deref());
    logger::set_echo(args.verbose || ctx.settings.log_echo);

    let result = match &args.command {
        Command::List => {
            list(&ctx);
            Ok(())
        }
        Command::Describe { filter } => describe(&ctx, filter),
        Command::Render(render) => run_render(&ctx, render, args.verbose),
        Command::Session(session) => run_session(&ctx, session),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// list / describe
// ============================================================================

fn list(ctx: &Context) {
    for category in ctx.catalog.categories() {
        println!("{}", category);
        for schema in ctx.catalog.in_category(category) {
            println!("  {:<24} {}", schema.name, schema.display_name);
        }
    }
}

fn describe(ctx: &Context, name: &str) -> Result<(), String> {
    let schema = lookup(ctx, name)?;
    print!("{}", describe_schema(schema));
    Ok(())
}

fn describe_schema(schema: &FilterSchema) -> String {
    let mut out = format!("{} ({})\n", schema.name, schema.display_name);
    out.push_str(&format!("  categories: {}\n", schema.categories.join(", ")));
    for spec in &schema.inputs {
        out.push_str(&format!("  {:<22} {:<7}", spec.key, spec.class.label()));
        if let Some(default) = &spec.default {
            out.push_str(&format!(" default {}", default));
        }
        if let (Some(min), Some(max)) = (spec.slider_min, spec.slider_max) {
            out.push_str(&format!(" range {}..{}", min, max));
        }
        if !spec.description.is_empty() {
            out.push_str(&format!("  {}", spec.description));
        }
        out.push('\n');
    }
    out
}

fn lookup<'a>(ctx: &'a Context, name: &str) -> Result<&'a FilterSchema, String> {
    ctx.catalog.schema(name).ok_or_else(|| {
        format!(
            "unknown filter '{}'. Run `filterscope list` to see the catalog.",
            name
        )
    })
}

// ============================================================================
// render
// ============================================================================

fn run_render(ctx: &Context, args: &RenderArgs, verbose: bool) -> Result<(), String> {
    // -- Request: preset, then --filter, then --set edits ----------------
    let mut params = FilterParams::new();
    let mut filter = None;
    if let Some(path) = &args.preset {
        let preset = load_preset(path, &ctx.assets)
            .map_err(|e| format!("could not load preset '{}': {}", path.display(), e))?;
        filter = Some(preset.filter);
        params = preset.params;
    }
    if let Some(name) = &args.filter {
        filter = Some(name.clone());
    }
    let filter = filter.ok_or("no filter given; use --filter NAME or --preset FILE")?;
    let schema = lookup(ctx, &filter)?;

    for text in &args.set {
        let (key, value) = parse_assignment(text, &ctx.assets).map_err(|e| e.to_string())?;
        if schema.input(&key).is_none() {
            eprintln!("warning: {} has no input '{}'; ignored when rendering.", filter, key);
        }
        params.set(key, value);
    }

    let request = FilterRequest { filter, params };
    if let Some(path) = &args.save_preset {
        save_preset(&request, path)
            .map_err(|e| format!("could not save preset '{}': {}", path.display(), e))?;
        if verbose {
            println!("preset → {}", path.display());
        }
    }

    // -- Inputs -----------------------------------------------------------
    let inputs = if args.input.is_empty() {
        vec![None]
    } else {
        let resolved = resolve_inputs(&args.input);
        if resolved.is_empty() {
            return Err("no input files matched the given pattern(s).".into());
        }
        resolved.into_iter().map(Some).collect()
    };

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        return Err(format!(
            "{} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        ));
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).map_err(|e| {
            format!("could not create output directory '{}': {}", dir.display(), e)
        })?;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut failures = 0usize;

    for (idx, input) in inputs.iter().enumerate() {
        let label = input
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("@{}", ctx.settings.default_asset));
        if multi || verbose {
            println!("[{}/{}] {}", idx + 1, total, label);
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input.as_deref(),
            &request.filter,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", label);
            failures += 1;
            continue;
        };

        let result = render_one(ctx, &request, input.as_deref()).and_then(|frame| {
            encode_and_write(&frame, &output_path, save_format, args.quality)
                .map_err(|e| format!("save failed: {}", e))
        });
        match result {
            Ok(()) => {
                if verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                failures += 1;
            }
        }
    }

    if failures == 0 {
        Ok(())
    } else {
        Err(format!("{} of {} renders failed", failures, total))
    }
}

/// Run `request` over one input through a full preview session and return
/// the presented frame.
fn render_one(
    ctx: &Context,
    request: &FilterRequest,
    input: Option<&Path>,
) -> Result<RgbaImage, String> {
    let image = match input {
        Some(path) => {
            let pixels = load_image_sync(path).map_err(|e| format!("load failed: {}", e))?;
            ImageRef::new(path.display().to_string(), pixels)
        }
        None => ctx.default_image(),
    };

    let session = ctx.session(Vec::new())?;
    let editor = session.editor();
    // Parameters go in before the filter is selected, so sanitation sees
    // them and exactly one render runs.
    editor.merge_params(request.params.clone());
    if input.is_some() {
        editor.set_param(INPUT_IMAGE_KEY, ParamValue::Image(image));
    }
    editor.select_filter(request.filter.clone());
    editor.shutdown();

    let frames = session.run();
    frames
        .into_iter()
        .last()
        .map(|frame| frame.pixels)
        .ok_or_else(|| format!("{} produced no output", request.filter))
}

// ============================================================================
// session
// ============================================================================

#[derive(Debug, PartialEq)]
enum SessionCommand {
    Filter(String),
    Set(String, ParamValue),
    Save(PathBuf),
    Quit,
}

/// Parse one stdin line.  Blank lines and `#` comments yield `None`.
fn parse_session_line(
    line: &str,
    assets: &AssetLibrary,
) -> Result<Option<SessionCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb {
        "filter" if !rest.is_empty() => SessionCommand::Filter(rest.to_string()),
        "set" => {
            let Some((key, value)) = rest.split_once(char::is_whitespace) else {
                return Err("usage: set KEY VALUE".into());
            };
            let value = ParamValue::parse(value, assets).map_err(|e| e.to_string())?;
            SessionCommand::Set(key.to_string(), value)
        }
        "save" if !rest.is_empty() => SessionCommand::Save(PathBuf::from(rest)),
        "quit" | "exit" => SessionCommand::Quit,
        _ => {
            return Err(format!(
                "unrecognised command '{}' (filter NAME | set KEY VALUE | save PATH | quit)",
                line
            ));
        }
    };
    Ok(Some(command))
}

fn run_session(ctx: &Context, args: &SessionArgs) -> Result<(), String> {
    let format = SaveFormat::from_path(&args.output).unwrap_or_default();
    let sink = FrameFileSink::new(&args.output, format, args.quality);
    let session = ctx.session(sink)?;
    let editor = session.editor();

    if let Some(path) = &args.input {
        let pixels = load_image_sync(path).map_err(|e| format!("load failed: {}", e))?;
        editor.set_param(
            INPUT_IMAGE_KEY,
            ParamValue::Image(ImageRef::new(path.display().to_string(), pixels)),
        );
    }

    let lane = session.spawn().map_err(|e| e.to_string())?;
    println!("frames → {}", args.output.display());

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match parse_session_line(&line, &ctx.assets) {
            Ok(Some(SessionCommand::Filter(name))) => {
                if ctx.catalog.schema(&name).is_none() {
                    eprintln!("unknown filter '{}'", name);
                    continue;
                }
                editor.select_filter(name);
            }
            Ok(Some(SessionCommand::Set(key, value))) => {
                editor.set_param(key, value);
            }
            Ok(Some(SessionCommand::Save(path))) => {
                editor.save_preset(path);
            }
            Ok(Some(SessionCommand::Quit)) => break,
            Ok(None) => {}
            Err(e) => eprintln!("{}", e),
        }
    }

    editor.shutdown();
    let sink = lane
        .join()
        .map_err(|_| crate::preview::SessionError::Panicked.to_string())?;
    println!("{} frame(s) written to {}", sink.written(), sink.path().display());
    match sink.last_error() {
        Some(e) => Err(format!("last frame could not be written: {}", e)),
        None => Ok(()),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins, then the output extension, then PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    format_arg
        .and_then(SaveFormat::from_name)
        .or_else(|| output.and_then(SaveFormat::from_path))
        .unwrap_or_default()
}

/// Compute the output path for one render.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` joined with the input stem (or the filter name)
/// 3. next to the input, `_out` appended when it would overwrite the input
fn build_output_path(
    input: Option<&Path>,
    filter: &str,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = match input {
        Some(path) => path.file_stem()?.to_string_lossy().into_owned(),
        None => filter.to_string(),
    };

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    if input == Some(candidate.as_path()) {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
