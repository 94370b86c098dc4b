// ============================================================================
// PREVIEW SETTINGS: persisted key=value configuration
// ============================================================================

use std::path::{Path, PathBuf};

use image::Rgba;

use crate::assets::DEFAULT_ASSET;
use crate::render::FrameSpec;

/// Largest frame edge accepted from a settings file.
const MAX_FRAME_SIZE: u32 = 8192;

#[derive(Clone, Debug, PartialEq)]
pub struct PreviewSettings {
    /// Edge length of the square preview frame.
    pub frame_size: u32,
    /// Colour shown behind undersized renders.
    pub background: Rgba<u8>,
    /// Asset fed to image inputs the user has not set.
    pub default_asset: String,
    /// Extra directory of images registered as assets at startup.
    pub asset_dir: Option<PathBuf>,
    /// Mirror log lines on stderr.
    pub log_echo: bool,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            frame_size: FrameSpec::CANONICAL_SIZE,
            background: Rgba([0, 0, 0, 255]),
            default_asset: DEFAULT_ASSET.to_string(),
            asset_dir: None,
            log_echo: false,
        }
    }
}

impl PreviewSettings {
    pub fn frame_spec(&self) -> FrameSpec {
        FrameSpec::square(self.frame_size, self.background)
    }

    /// Platform settings file location.
    ///
    /// `~/.config/filterscope/filterscope_settings.cfg` (Linux, XDG respected)
    /// `%APPDATA%\Filterscope\filterscope_settings.cfg` (Windows)
    /// `~/Library/Application Support/Filterscope/filterscope_settings.cfg` (macOS)
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        let config_dir = std::env::var("APPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(|d| PathBuf::from(d).join("Filterscope"))?;

        #[cfg(target_os = "macos")]
        let config_dir = std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/Filterscope"))?;

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
            .ok()
            .map(|d| d.join("filterscope"))?;

        Some(config_dir.join("filterscope_settings.cfg"))
    }

    /// Load from the platform location; defaults when absent or unreadable.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        Self::parse(&content)
    }

    /// Parse settings text.  Unknown keys and malformed values keep their
    /// defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "frame_size" => {
                    if let Ok(v) = val.parse::<u32>()
                        && (1..=MAX_FRAME_SIZE).contains(&v)
                    {
                        s.frame_size = v;
                    }
                }
                "background" => {
                    if let Some(c) = parse_rgba(val) {
                        s.background = c;
                    }
                }
                "default_asset" => {
                    if !val.is_empty() {
                        s.default_asset = val.to_string();
                    }
                }
                "asset_dir" => {
                    s.asset_dir = (!val.is_empty()).then(|| PathBuf::from(val));
                }
                "log_echo" => s.log_echo = val == "true",
                _ => {}
            }
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let [r, g, b, a] = self.background.0;
        format!(
            "frame_size={}\n\
             background={r},{g},{b},{a}\n\
             default_asset={}\n\
             asset_dir={}\n\
             log_echo={}\n",
            self.frame_size,
            self.default_asset,
            self.asset_dir
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.log_echo,
        )
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Save to the platform location.
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::settings_path().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no config directory")
        })?;
        self.save_to(&path)
    }
}

fn parse_rgba(text: &str) -> Option<Rgba<u8>> {
    let parts: Vec<u8> = text
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [r, g, b] => Some(Rgba([*r, *g, *b, 255])),
        [r, g, b, a] => Some(Rgba([*r, *g, *b, *a])),
        _ => None,
    }
}
