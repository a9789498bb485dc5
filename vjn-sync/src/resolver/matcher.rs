//! Fuzzy matching of playlist entries against search candidates
//!
//! Radio playlists credit artists loosely ("Jay-Z & Beyoncé", "X feat. Y",
//! remaster suffixes in brackets), so both sides are normalized before
//! comparing. Artist similarity weighs 70%, title similarity 30%.

use super::TrackCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use vjn_common::PlaylistEntry;

pub const ARTIST_WEIGHT: f64 = 0.7;
pub const TITLE_WEIGHT: f64 = 0.3;
/// Only the top results of a search are scored
pub const MAX_CANDIDATES: usize = 10;
/// Score given when one normalized string contains the other
pub const CONTAINMENT_SCORE: f64 = 0.85;
/// Similarity a single credited artist needs to count as matched
pub const PART_MATCH_THRESHOLD: f64 = 0.7;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("valid regex"));
static FEATURING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(feat\.?|ft\.?|featuring)\b.*").expect("valid regex"));
static VERSUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+vs\.?\s+").expect("valid regex"));
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.,;]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+&\s+|\s+and\s+|\s*,\s*|\s+feat\.?\s+|\s+ft\.?\s+|\s+featuring\s+")
        .expect("valid regex")
});

/// A candidate together with its weighted score
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a TrackCandidate,
    pub score: f64,
}

/// Lowercase and strip accents from Latin-1 and Latin Extended-A letters
fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => out.push('a'),
            'æ' => out.push_str("ae"),
            'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => out.push('c'),
            'ď' | 'đ' | 'ð' => out.push('d'),
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => out.push('e'),
            'ĝ' | 'ğ' | 'ġ' | 'ģ' => out.push('g'),
            'ĥ' | 'ħ' => out.push('h'),
            'ì' | 'í' | 'î' | 'ï' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => out.push('i'),
            'ĳ' => out.push_str("ij"),
            'ĵ' => out.push('j'),
            'ķ' => out.push('k'),
            'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => out.push('l'),
            'ñ' | 'ń' | 'ņ' | 'ň' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => out.push('o'),
            'œ' => out.push_str("oe"),
            'ŕ' | 'ŗ' | 'ř' => out.push('r'),
            'ß' => out.push_str("ss"),
            'ś' | 'ŝ' | 'ş' | 'š' | 'ș' => out.push('s'),
            'ţ' | 'ť' | 'ŧ' | 'ț' => out.push('t'),
            'þ' => out.push_str("th"),
            'ù' | 'ú' | 'û' | 'ü' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => out.push('u'),
            'ŵ' => out.push('w'),
            'ý' | 'ÿ' | 'ŷ' => out.push('y'),
            'ź' | 'ż' | 'ž' => out.push('z'),
            // Dot left over from lowercasing 'İ'
            '\u{0307}' => {}
            other => out.push(other),
        }
    }
    out
}

/// Normalize an artist or title for comparison
///
/// Lowercases, folds accents, drops bracketed suffixes and featuring credits,
/// spells out `&`, and collapses whitespace.
pub fn normalize(s: &str) -> String {
    let s = fold(s);
    let s = BRACKETED.replace_all(&s, "");
    let s = FEATURING.replace_all(&s, "");
    let s = s.replace('&', "and");
    let s = VERSUS.replace_all(&s, " ");
    let s = PUNCTUATION.replace_all(&s, "");
    let s = WHITESPACE.replace_all(&s, " ");
    s.trim().to_string()
}

/// Similarity of two strings after normalization, 0.0..=1.0
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return CONTAINMENT_SCORE;
    }
    strsim::normalized_levenshtein(&a, &b)
}

/// Split a credit like "A & B feat. C" into its artists
pub fn split_artists(artist: &str) -> Vec<String> {
    ARTIST_SEPARATOR
        .split(artist)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Search queries to try for an entry, most specific first
///
/// "artist title", then "first-artist title" for multi-artist credits, then
/// the bare title. Duplicates are dropped.
pub fn search_queries(entry: &PlaylistEntry) -> Vec<String> {
    let artist = entry.artist.trim();
    let title = entry.title.trim();

    let mut queries = Vec::with_capacity(3);
    let mut push = |q: String| {
        let q = q.trim().to_string();
        if !q.is_empty() && !queries.contains(&q) {
            queries.push(q);
        }
    };

    push(format!("{} {}", artist, title));
    if let Some(first) = split_artists(artist).into_iter().next() {
        push(format!("{} {}", first, title));
    }
    push(title.to_string());
    queries
}

/// Artist similarity between a playlist credit and a candidate's artists
fn artist_score(entry_artist: &str, candidate_artists: &[String]) -> f64 {
    let parts = split_artists(entry_artist);

    if parts.len() > 1 {
        let full = similarity(entry_artist, &candidate_artists.join(" "));
        let matched = parts
            .iter()
            .filter(|part| {
                candidate_artists
                    .iter()
                    .any(|a| similarity(part, a) >= PART_MATCH_THRESHOLD)
            })
            .count();
        let multi = matched as f64 / parts.len() as f64;
        full.max(multi)
    } else {
        candidate_artists
            .iter()
            .map(|a| similarity(entry_artist, a))
            .fold(0.0, f64::max)
    }
}

/// Weighted score of one candidate for an entry
pub fn score(entry: &PlaylistEntry, candidate: &TrackCandidate) -> f64 {
    if candidate.artists.is_empty() {
        return 0.0;
    }
    let artist = artist_score(&entry.artist, &candidate.artists);
    let title = similarity(&entry.title, &candidate.name);
    artist * ARTIST_WEIGHT + title * TITLE_WEIGHT
}

/// Best candidate scoring at least `threshold`
///
/// Equal scores are broken by provider popularity, then by search order.
pub fn best_match<'a>(
    entry: &PlaylistEntry,
    candidates: &'a [TrackCandidate],
    threshold: f64,
) -> Option<ScoredCandidate<'a>> {
    let mut best: Option<ScoredCandidate<'a>> = None;

    for candidate in candidates.iter().take(MAX_CANDIDATES) {
        let s = score(entry, candidate);
        let better = match &best {
            None => true,
            Some(current) if s > current.score => true,
            Some(current) if s == current.score => {
                candidate.popularity.unwrap_or(0) > current.candidate.popularity.unwrap_or(0)
            }
            Some(_) => false,
        };
        if better {
            best = Some(ScoredCandidate {
                candidate,
                score: s,
            });
        }
    }

    best.filter(|b| b.score >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, artists: &[&str], name: &str, popularity: Option<u32>) -> TrackCandidate {
        TrackCandidate {
            id: id.to_string(),
            uri: format!("spotify:track:{}", id),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            popularity,
        }
    }

    #[test]
    fn test_normalize_strips_noise() {
        assert_eq!(normalize("Hey Ya! (Radio Mix)"), "hey ya!");
        assert_eq!(normalize("Seven Nation Army [2003 Remaster]"), "seven nation army");
        assert_eq!(normalize("Eminem feat. Dido"), "eminem");
        assert_eq!(normalize("Simon & Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize("Armin vs. Tiësto"), "armin tiesto");
        assert_eq!(normalize("  K's   Choice  "), "k's choice");
    }

    #[test]
    fn test_normalize_folds_diacritics() {
        assert_eq!(normalize("Beyoncé"), "beyonce");
        assert_eq!(normalize("Mötley Crüe"), "motley crue");
        assert_eq!(normalize("Röyksopp"), "royksopp");
    }

    #[test]
    fn test_normalize_folds_central_european_and_turkish_letters() {
        assert_eq!(normalize("Dvořák"), "dvorak");
        assert_eq!(normalize("Věra Bílá"), "vera bila");
        assert_eq!(normalize("Erdoğan Işık"), "erdogan isik");
        assert_eq!(normalize("İbrahim Tatlıses"), "ibrahim tatlises");
        assert_eq!(normalize("Ákos Kőszegi Győző"), "akos koszegi gyozo");
        assert_eq!(normalize("Lepa Brena Đorđević"), "lepa brena dordevic");
    }

    #[test]
    fn test_similarity_exact_then_containment() {
        assert_eq!(similarity("Outkast", "OutKast"), 1.0);
        assert_eq!(similarity("White Stripes", "The White Stripes"), CONTAINMENT_SCORE);
        assert_eq!(similarity("", "anything"), 0.0);
        assert!(similarity("Outkast", "Madonna") < 0.5);
    }

    #[test]
    fn test_split_artists() {
        assert_eq!(
            split_artists("Jay-Z & Beyoncé"),
            vec!["Jay-Z".to_string(), "Beyoncé".to_string()]
        );
        assert_eq!(
            split_artists("Eminem feat. Dido, Rihanna"),
            vec!["Eminem", "Dido", "Rihanna"]
        );
        assert_eq!(split_artists("Daft Punk"), vec!["Daft Punk"]);
    }

    #[test]
    fn test_search_queries_fallback_order() {
        let entry = PlaylistEntry::new("Jay-Z & Beyoncé", "Crazy In Love");
        assert_eq!(
            search_queries(&entry),
            vec![
                "Jay-Z & Beyoncé Crazy In Love",
                "Jay-Z Crazy In Love",
                "Crazy In Love"
            ]
        );

        let single = PlaylistEntry::new("Outkast", "Hey Ya!");
        assert_eq!(search_queries(&single), vec!["Outkast Hey Ya!", "Hey Ya!"]);
    }

    #[test]
    fn test_exact_match_wins() {
        let entry = PlaylistEntry::new("Outkast", "Hey Ya!");
        let candidates = vec![
            candidate("cover", &["Karaoke Kings"], "Hey Ya!", Some(10)),
            candidate("orig", &["OutKast"], "Hey Ya! - Radio Mix", Some(80)),
        ];
        let best = best_match(&entry, &candidates, 0.7).unwrap();
        assert_eq!(best.candidate.id, "orig");
    }

    #[test]
    fn test_multi_artist_credit_matches() {
        let entry = PlaylistEntry::new("Jay-Z & Beyoncé", "Crazy In Love");
        let candidates = vec![candidate(
            "t1",
            &["Beyoncé", "JAY-Z"],
            "Crazy In Love (feat. Jay-Z)",
            None,
        )];
        let best = best_match(&entry, &candidates, 0.7).unwrap();
        assert!(best.score > 0.99);
    }

    #[test]
    fn test_below_threshold_is_none() {
        let entry = PlaylistEntry::new("Outkast", "Hey Ya!");
        let candidates = vec![candidate("t1", &["Madonna"], "Vogue", Some(90))];
        assert!(best_match(&entry, &candidates, 0.7).is_none());
    }

    #[test]
    fn test_candidate_without_artists_scores_zero() {
        let entry = PlaylistEntry::new("Outkast", "Hey Ya!");
        assert_eq!(score(&entry, &candidate("t1", &[], "Hey Ya!", None)), 0.0);
    }

    #[test]
    fn test_tie_broken_by_popularity_then_order() {
        let entry = PlaylistEntry::new("Coldplay", "Yellow");
        let candidates = vec![
            candidate("a", &["Coldplay"], "Yellow", Some(40)),
            candidate("b", &["Coldplay"], "Yellow", Some(85)),
            candidate("c", &["Coldplay"], "Yellow", Some(85)),
        ];
        assert_eq!(best_match(&entry, &candidates, 0.7).unwrap().candidate.id, "b");

        let unranked = vec![
            candidate("first", &["Coldplay"], "Yellow", None),
            candidate("second", &["Coldplay"], "Yellow", None),
        ];
        assert_eq!(
            best_match(&entry, &unranked, 0.7).unwrap().candidate.id,
            "first"
        );
    }

    #[test]
    fn test_only_top_candidates_considered() {
        let entry = PlaylistEntry::new("Coldplay", "Yellow");
        let mut candidates: Vec<_> = (0..MAX_CANDIDATES)
            .map(|i| candidate(&format!("noise{}", i), &["Madonna"], "Vogue", None))
            .collect();
        candidates.push(candidate("late", &["Coldplay"], "Yellow", None));
        assert!(best_match(&entry, &candidates, 0.7).is_none());
    }
}
