//! Track records produced by the loader

use serde::Serialize;

/// One cleaned dataset row
///
/// `features` holds the raw values in schema order. `index` is the row
/// position after cleaning and is stable for the lifetime of a model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub index: usize,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    pub release_year: Option<i32>,
    pub duration_ms: Option<u64>,
    pub features: Vec<f64>,
}

impl TrackRecord {
    /// First credited artist, or "" when the row had none
    pub fn primary_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }

    pub fn artists_display(&self) -> String {
        self.artists.join(", ")
    }

    /// Duration as `m:ss`
    pub fn duration_display(&self) -> Option<String> {
        self.duration_ms.map(format_duration)
    }
}

/// Format milliseconds as `m:ss`
pub fn format_duration(duration_ms: u64) -> String {
    let minutes = duration_ms / 60_000;
    let seconds = (duration_ms % 60_000) / 1000;
    format!("{}:{:02}", minutes, seconds)
}

/// Parse an `artists` cell
///
/// Accepts a list literal as found in Spotify dumps (`['A', "B's"]`) or a
/// plain string naming a single artist.
pub fn parse_artists(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let inner = match trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(inner) => inner,
        None => return vec![trimmed.to_string()],
    };

    let mut artists = Vec::new();
    let mut chars = inner.chars();
    let mut saw_quote = false;

    while let Some(c) = chars.next() {
        if c != '\'' && c != '"' {
            continue;
        }
        saw_quote = true;
        let quote = c;
        let mut current = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                c if c == quote => break,
                c => current.push(c),
            }
        }
        let name = current.trim();
        if !name.is_empty() {
            artists.push(name.to_string());
        }
    }

    if !saw_quote {
        // Unquoted list: [A, B]
        artists = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    artists
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_literal() {
        assert_eq!(
            parse_artists("['Daft Punk', 'Pharrell Williams']"),
            vec!["Daft Punk", "Pharrell Williams"]
        );
        assert_eq!(parse_artists("[\"Guns N' Roses\"]"), vec!["Guns N' Roses"]);
        assert_eq!(parse_artists("['It\\'s Me']"), vec!["It's Me"]);
    }

    #[test]
    fn test_parse_plain_and_empty() {
        assert_eq!(parse_artists("  Radiohead "), vec!["Radiohead"]);
        assert!(parse_artists("").is_empty());
        assert!(parse_artists("[]").is_empty());
        assert_eq!(parse_artists("[A, B]"), vec!["A", "B"]);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(215_000), "3:35");
        assert_eq!(format_duration(61_999), "1:01");
    }

    #[test]
    fn test_primary_artist() {
        let record = TrackRecord {
            index: 0,
            name: "Get Lucky".to_string(),
            artists: vec!["Daft Punk".to_string(), "Pharrell Williams".to_string()],
            album: String::new(),
            release_year: Some(2013),
            duration_ms: Some(248_000),
            features: vec![0.5],
        };
        assert_eq!(record.primary_artist(), "Daft Punk");
        assert_eq!(record.artists_display(), "Daft Punk, Pharrell Williams");
        assert_eq!(record.duration_display().as_deref(), Some("4:08"));
    }
}
