//! LRC parsing.
//!
//! A line may carry several timestamps (`[00:12.34][01:02.345]text`); each
//! produces its own entry. Two-digit fractions are hundredths. The result is
//! stably sorted by time and lines without text are dropped.

use std::sync::OnceLock;

use bridge_traits::music::{LyricData, LyricLine};
use regex::Regex;

use crate::types::LyricResponse;

fn line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^((\[\d+:\d{2}[.:]\d{2,3}\])+)(.*)$").expect("valid lrc line regex")
    })
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(\d+):(\d{2})[.:](\d{2,3})\](.*)$").expect("valid lrc tag regex")
    })
}

/// Parse raw LRC text into time-sorted lines.
pub fn parse_lrc(raw: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();

    for line in raw.lines() {
        let Some(caps) = line_regex().captures(line.trim()) else {
            continue;
        };
        let text = caps.get(3).map_or("", |m| m.as_str()).trim();
        let mut tags = caps.get(1).map_or("", |m| m.as_str());

        while let Some(tag) = tag_regex().captures(tags) {
            let minute: f64 = tag[1].parse().unwrap_or_default();
            let second: f64 = tag[2].parse().unwrap_or_default();
            let fraction = &tag[3];
            let millis: f64 = if fraction.len() == 2 {
                format!("{}0", fraction).parse().unwrap_or_default()
            } else {
                fraction.parse().unwrap_or_default()
            };
            lines.push(LyricLine {
                time: minute * 60.0 + second + millis / 1000.0,
                text: text.to_string(),
            });
            tags = tag.get(4).map_or("", |m| m.as_str());
        }
    }

    // `sort_by` is stable: simultaneous lines keep file order.
    lines.sort_by(|a, b| a.time.total_cmp(&b.time));
    lines.retain(|line| !line.text.is_empty());
    lines
}

/// Build [`LyricData`] from the lyric endpoint's response.
///
/// An empty original table yields the placeholder lyric.
pub fn lyric_from_response(response: &LyricResponse) -> LyricData {
    let original = parse_lrc(response.lrc.as_ref().map_or("", |l| l.lyric.as_str()));
    if original.is_empty() {
        return LyricData::placeholder();
    }
    let translation = parse_lrc(response.tlyric.as_ref().map_or("", |l| l.lyric.as_str()));
    let contributors = [&response.lyric_user, &response.trans_user]
        .into_iter()
        .flatten()
        .map(|user| user.nickname.clone())
        .collect();

    LyricData {
        original,
        translation,
        contributors,
    }
}
