use clap::Parser;
use std::path::PathBuf;

/// Free-space-driven defragmentation and placement engine.
///
/// `PATH` defaults to every fixed, writable, local volume; this build has no
/// real OS volume enumerator, so a path is required and is handed to the
/// bundled file-backed volume implementation.
#[derive(Parser, Debug, Clone)]
#[command(name = "defrag-engine")]
#[command(version = "0.1.0")]
#[command(about = "Defragmentation and placement engine", long_about = None)]
pub struct Args {
    /// Volume path or backing image to operate on
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Optimize mode: 0=analyze, 1=analyze+fixup, 2/3=analyze+fixup+fastopt,
    /// 4=force-together, 5=move-to-end, 6=sort-by-name, 7=sort-by-size,
    /// 8=sort-by-access, 9=sort-by-changed, 10=sort-by-created
    #[arg(short = 'a', long = "mode", default_value = "2")]
    pub mode: u8,

    /// Target run speed, 1-100 percent of wall-clock time
    #[arg(short = 's', long = "speed", default_value = "100")]
    pub speed: u8,

    /// Free space percentage to reserve ahead of each zone, 0-100
    #[arg(short = 'f', long = "free-space", default_value = "5")]
    pub free_space: u8,

    /// Debug/verbosity level, 0 (fatal only) through 6 (detailed gap finding)
    #[arg(short = 'd', long = "debug-level", default_value = "1")]
    pub debug_level: u8,

    /// Write a log of the run to this file
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Mask of paths to exclude entirely from any phase (repeatable)
    #[arg(short = 'e', long = "exclude")]
    pub exclude: Vec<String>,

    /// Mask of paths to treat as space hogs in addition to the built-ins (repeatable)
    #[arg(short = 'u', long = "space-hog")]
    pub space_hog: Vec<String>,

    /// Quit the process once the run finishes
    #[arg(short = 'q', long = "quit-on-finish")]
    pub quit_on_finish: bool,

    /// Treat the MFT reserved zone as ordinary free space
    #[arg(long = "ignore-mft-excludes")]
    pub ignore_mft_excludes: bool,

    /// Move the MFT itself to the start of the volume after the main run
    #[arg(long = "enable-mft-move")]
    pub enable_mft_move: bool,

    /// Skip the built-in space-hog mask list, using only `-u` masks
    #[arg(long = "disable-default-hogs")]
    pub disable_default_hogs: bool,

    /// Write a JSON run summary to this file
    #[arg(long = "json-report")]
    pub json_report: Option<PathBuf>,
}

impl Args {
    /// Validates flag ranges before any engine work starts, mirroring
    /// `EngineConfig::build`'s checks so a bad flag is reported immediately.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=100).contains(&self.speed) {
            return Err(format!("-s {} must be in 1..=100", self.speed));
        }
        if self.free_space > 100 {
            return Err(format!("-f {} must be in 0..=100", self.free_space));
        }
        if self.mode > 10 {
            return Err(format!("-a {} is not a known optimize mode", self.mode));
        }
        if self.debug_level > 6 {
            return Err(format!("-d {} must be in 0..=6", self.debug_level));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            path: Some(PathBuf::from("C:\\")),
            mode: 2,
            speed: 100,
            free_space: 5,
            debug_level: 1,
            log_file: None,
            exclude: vec![],
            space_hog: vec![],
            quit_on_finish: false,
            ignore_mft_excludes: false,
            enable_mft_move: false,
            disable_default_hogs: false,
            json_report: None,
        }
    }

    #[test]
    fn default_shaped_args_validate() {
        assert!(base_args().validate().is_ok());
    }

    #[test]
    fn rejects_speed_out_of_range() {
        let mut args = base_args();
        args.speed = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        let mut args = base_args();
        args.mode = 42;
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_free_space_out_of_range() {
        let mut args = base_args();
        args.free_space = 101;
        assert!(args.validate().is_err());
    }

    #[test]
    fn rejects_debug_level_out_of_range() {
        let mut args = base_args();
        args.debug_level = 7;
        assert!(args.validate().is_err());
    }
}
