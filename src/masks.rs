//! Wildcard mask matching and the built-in unmovable/space-hog lists, per
//! spec.md §4.8 phase 1 and §6.

use regex::RegexBuilder;

/// A case-insensitive `*`/`?` wildcard mask, compiled once to a regex.
pub struct Mask {
    pattern: String,
    regex: regex::Regex,
}

impl Mask {
    pub fn new(pattern: &str) -> Self {
        let mut escaped = String::with_capacity(pattern.len() * 2);
        escaped.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => escaped.push_str(".*"),
                '?' => escaped.push('.'),
                c => escaped.push_str(&regex::escape(&c.to_string())),
            }
        }
        escaped.push('$');
        let regex = RegexBuilder::new(&escaped)
            .case_insensitive(true)
            .build()
            .expect("mask pattern always compiles to a valid regex");
        Self { pattern: pattern.to_owned(), regex }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// True if either path matches this mask (spec.md §6: "an item matches
    /// if either its long or short path matches").
    pub fn matches_either(&self, long_path: Option<&str>, short_path: Option<&str>) -> bool {
        long_path.map_or(false, |p| self.regex.is_match(p)) || short_path.map_or(false, |p| self.regex.is_match(p))
    }
}

/// True if any mask in `masks` matches either path.
pub fn any_matches(masks: &[Mask], long_path: Option<&str>, short_path: Option<&str>) -> bool {
    masks.iter().any(|m| m.matches_either(long_path, short_path))
}

/// The hard-coded unmovable list (spec.md §4.8 phase 1): hibernation file,
/// page file, the MFT itself, and the bad-cluster file.
pub fn builtin_unmovable_masks() -> Vec<Mask> {
    ["*\\hiberfil.sys", "*\\pagefile.sys", "?:\\$MFT", "$BadClus"].into_iter().map(Mask::new).collect()
}

/// The default space-hog masks applied unless `--disable-default-hogs` is
/// given (spec.md §6): recycle bins, update caches, installer/symbol/font
/// folders, and large/archive extensions.
pub fn builtin_space_hog_masks() -> Vec<Mask> {
    [
        "*\\$Recycle.Bin\\*",
        "*\\RECYCLER\\*",
        "*\\SoftwareDistribution\\Download\\*",
        "*\\Installer\\*",
        "*\\Symbols\\*",
        "*\\Fonts\\*",
        "*.7z",
        "*.zip",
        "*.rar",
        "*.iso",
        "*.mp3",
        "*.avi",
        "*.mkv",
        "*.mp4",
    ]
    .into_iter()
    .map(Mask::new)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        let mask = Mask::new("*\\pagefile.sys");
        assert!(mask.matches_either(Some("C:\\pagefile.sys"), None));
        assert!(!mask.matches_either(Some("C:\\pagefile.sys.bak"), None));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let mask = Mask::new("?:\\$MFT");
        assert!(mask.matches_either(Some("C:\\$MFT"), None));
        assert!(!mask.matches_either(Some("CC:\\$MFT"), None));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mask = Mask::new("*.MP3");
        assert!(mask.matches_either(Some("song.mp3"), None));
    }

    #[test]
    fn matches_either_long_or_short_path() {
        let mask = Mask::new("*\\progra~1\\*");
        assert!(mask.matches_either(Some("C:\\Program Files\\x"), Some("C:\\progra~1\\x")));
    }

    #[test]
    fn builtin_unmovable_masks_cover_hiberfil_and_mft() {
        let masks = builtin_unmovable_masks();
        assert!(any_matches(&masks, Some("C:\\hiberfil.sys"), None));
        assert!(any_matches(&masks, Some("C:\\$MFT"), None));
        assert!(!any_matches(&masks, Some("C:\\notes.txt"), None));
    }

    #[test]
    fn pattern_accessor_returns_original_text() {
        let mask = Mask::new("*.iso");
        assert_eq!(mask.pattern(), "*.iso");
    }
}
