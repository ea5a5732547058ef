use anyhow::{Context, Result};
use regex::Regex;

const SEPARATORS: &[char] = &['/', '\\'];

enum Segment {
    /// Case-insensitive exact match; mask stored lowercased.
    Literal(String),
    /// `*`/`?` segment compiled to a case-insensitive regex.
    Glob(Regex),
    /// `**`: zero or more path segments.
    Subtree,
}

/// One include/exclude pattern. A leading `!` marks an exclude pattern.
pub struct Wildcard {
    parts: Vec<Segment>,
    exclude: bool,
}

impl Wildcard {
    pub fn parse(mask: &str) -> Result<Wildcard> {
        let exclude = mask.starts_with('!');
        let body = if exclude { &mask[1..] } else { mask };
        let mut parts = Vec::new();
        for part in body.split(SEPARATORS).filter(|p| !p.is_empty()) {
            if part == "**" {
                parts.push(Segment::Subtree);
                continue;
            }
            let escaped = regex::escape(part);
            let pattern = escaped.replace("\\*", ".*").replace("\\?", ".");
            if pattern != escaped {
                let re = Regex::new(&format!("(?i){pattern}"))
                    .with_context(|| format!("bad wildcard segment {part:?}"))?;
                parts.push(Segment::Glob(re));
            } else {
                parts.push(Segment::Literal(part.to_lowercase()));
            }
        }
        Ok(Wildcard { parts, exclude })
    }

    pub fn exclude(&self) -> bool {
        self.exclude
    }

    /// `is_file` distinguishes file candidates from directory candidates: a
    /// pattern that runs out before the path does still selects a directory
    /// (so the walker recurses into it) but never a file, and an exclude
    /// pattern must fully cover whatever it excludes.
    pub fn is_match(&self, path: &str, is_file: bool) -> bool {
        let items: Vec<&str> = path.split(SEPARATORS).filter(|p| !p.is_empty()).collect();
        self.check(&items, 0, 0, is_file)
    }

    fn check(&self, items: &[&str], ipos: usize, ppos: usize, is_file: bool) -> bool {
        if ppos >= self.parts.len() {
            return true;
        }
        if ipos >= items.len() {
            return !(is_file || self.exclude);
        }
        match &self.parts[ppos] {
            Segment::Literal(mask) => {
                if *mask != items[ipos].to_lowercase() {
                    return false;
                }
            }
            Segment::Glob(re) => {
                if !re.is_match(items[ipos]) {
                    return false;
                }
            }
            Segment::Subtree => {
                // Consume one path segment into the subtree, or end it.
                if self.check(items, ipos + 1, ppos, is_file) {
                    return true;
                }
                return self.check(items, ipos, ppos + 1, is_file);
            }
        }
        self.check(items, ipos + 1, ppos + 1, is_file)
    }
}

/// Layered decision over an ordered pattern list: an empty list includes
/// everything; otherwise the last matching pattern wins. Scanning flips the
/// include state whenever a pattern of the opposite polarity matches.
pub fn is_included(wildcards: &[Wildcard], path: &str, is_file: bool) -> bool {
    if wildcards.is_empty() {
        return true;
    }
    let mut included = false;
    for w in wildcards {
        if included == w.exclude() && w.is_match(path, is_file) {
            included = !included;
        }
    }
    included
}
