//! Engine configuration, built from CLI `Args` (spec.md §6's flag grid).

use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::masks::{builtin_space_hog_masks, builtin_unmovable_masks, Mask};
use crate::types::{DebugLevel, OptimizeMode};

/// Resolved, validated configuration the orchestrator runs against. Unlike
/// `cli::Args`, masks are already compiled and the optimize mode is a typed
/// enum rather than a raw code.
pub struct EngineConfig {
    pub path: Option<PathBuf>,
    pub optimize_mode: OptimizeMode,
    pub speed_percent: u8,
    pub free_space_percent: u8,
    pub debug_level: DebugLevel,
    pub log_file: Option<PathBuf>,
    pub exclude_masks: Vec<Mask>,
    pub space_hog_masks: Vec<Mask>,
    pub unmovable_masks: Vec<Mask>,
    pub quit_on_finish: bool,
    pub ignore_mft_excludes: bool,
    pub enable_mft_move: bool,
    pub json_report: Option<PathBuf>,
}

impl EngineConfig {
    /// Builds a config from raw CLI fields, compiling masks and resolving
    /// the optimize-mode code. `exclude` / `user_hogs` are the raw `-e`/`-u`
    /// mask strings; `disable_default_hogs` skips the built-in hog list.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        path: Option<PathBuf>,
        optimize_code: u8,
        speed_percent: u8,
        free_space_percent: u8,
        debug_level_code: u8,
        log_file: Option<PathBuf>,
        exclude: &[String],
        user_hogs: &[String],
        quit_on_finish: bool,
        ignore_mft_excludes: bool,
        enable_mft_move: bool,
        disable_default_hogs: bool,
        json_report: Option<PathBuf>,
    ) -> Result<Self> {
        let optimize_mode = OptimizeMode::from_code(optimize_code)
            .ok_or_else(|| EngineError::Config(format!("invalid optimize mode -a {optimize_code}")))?;
        if !(1..=100).contains(&speed_percent) {
            return Err(EngineError::Config(format!("speed -s {speed_percent} must be in 1..=100")));
        }
        if free_space_percent > 100 {
            return Err(EngineError::Config(format!("free space -f {free_space_percent} must be in 0..=100")));
        }
        let debug_level = debug_level_from_code(debug_level_code)
            .ok_or_else(|| EngineError::Config(format!("invalid debug level -d {debug_level_code}")))?;

        let mut space_hog_masks: Vec<Mask> = user_hogs.iter().map(|m| Mask::new(m)).collect();
        if !disable_default_hogs {
            space_hog_masks.extend(builtin_space_hog_masks());
        }

        Ok(Self {
            path,
            optimize_mode,
            speed_percent,
            free_space_percent,
            debug_level,
            log_file,
            exclude_masks: exclude.iter().map(|m| Mask::new(m)).collect(),
            space_hog_masks,
            unmovable_masks: builtin_unmovable_masks(),
            quit_on_finish,
            ignore_mft_excludes,
            enable_mft_move,
            json_report,
        })
    }
}

fn debug_level_from_code(code: u8) -> Option<DebugLevel> {
    Some(match code {
        0 => DebugLevel::Fatal,
        1 => DebugLevel::Warning,
        2 => DebugLevel::Progress,
        3 => DebugLevel::DetailedProgress,
        4 => DebugLevel::DetailedFileInfo,
        5 => DebugLevel::DetailedGapFilling,
        6 => DebugLevel::DetailedGapFinding,
        _ => return None,
    })
}
