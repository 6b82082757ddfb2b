//! In-memory library index
//!
//! Documents are keyed by filename and scored against free-text queries
//! by token containment. The index holds the freshest known rating even
//! across playlist snapshots that carry none.

use std::collections::HashMap;

use musicbot_common::track::{PlaylistEntry, RATING_UNKNOWN};

pub struct SearchIndex {
    docs: HashMap<String, PlaylistEntry>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self {
            docs: HashMap::new(),
        }
    }

    /// Replace the document set with a fresh playlist snapshot. Ratings
    /// already known for a filename survive a snapshot that has none.
    pub fn reindex(&mut self, entries: Vec<PlaylistEntry>) {
        let mut docs = HashMap::with_capacity(entries.len());
        for mut entry in entries {
            if entry.rating == RATING_UNKNOWN {
                if let Some(old) = self.docs.get(&entry.filename) {
                    entry.rating = old.rating;
                }
            }
            docs.insert(entry.filename.clone(), entry);
        }
        self.docs = docs;
    }

    /// Refresh position and, when given, the rating of one document.
    pub fn update(&mut self, filename: &str, pos: i64, rating: Option<i32>) -> bool {
        match self.docs.get_mut(filename) {
            Some(doc) => {
                doc.pos = pos;
                if let Some(rating) = rating {
                    doc.rating = rating;
                }
                true
            }
            None => false,
        }
    }

    pub fn find(&self, filename: &str) -> Option<&PlaylistEntry> {
        self.docs.get(filename)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Score all documents against `query`, best first. Ties break on
    /// rating, then filename for a stable order.
    pub fn search(&self, query: &str) -> Vec<&PlaylistEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let tokens: Vec<&str> = needle.split_whitespace().collect();

        let mut scored: Vec<(i64, &PlaylistEntry)> = self
            .docs
            .values()
            .filter_map(|doc| {
                let score = score_doc(doc, &needle, &tokens);
                (score > 0).then_some((score, doc))
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| {
            sb.cmp(sa)
                .then(b.rating.cmp(&a.rating))
                .then(a.filename.cmp(&b.filename))
        });
        scored.into_iter().map(|(_, doc)| doc).collect()
    }

    /// Best match for `query`, if any.
    pub fn top_match(&self, query: &str) -> Option<&PlaylistEntry> {
        self.search(query).into_iter().next()
    }
}

impl Default for SearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn score_doc(doc: &PlaylistEntry, phrase: &str, tokens: &[&str]) -> i64 {
    let haystack = format!(
        "{} {} {}",
        doc.display_title().to_lowercase(),
        doc.artist.to_lowercase(),
        doc.title.to_lowercase()
    );
    let mut score = 0;
    // Whole-phrase hit outranks any scattering of tokens.
    if haystack.contains(phrase) {
        score += tokens.len() as i64 + 1;
    }
    score += tokens.iter().filter(|t| haystack.contains(**t)).count() as i64;
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicbot_common::track::RATING_DEFAULT;

    fn doc(filename: &str, artist: &str, title: &str, rating: i32) -> PlaylistEntry {
        PlaylistEntry {
            filename: filename.to_string(),
            artist: artist.to_string(),
            title: title.to_string(),
            last_modified: None,
            rating,
            duration_secs: 200,
            pos: 0,
            id: 1,
            prio: -1,
            submitter: None,
        }
    }

    fn index() -> SearchIndex {
        let mut idx = SearchIndex::new();
        idx.reindex(vec![
            doc(
                "Zero 7 - In The Waiting Line-5tZlu4wP4pw.mp3",
                "Zero 7",
                "In The Waiting Line",
                6,
            ),
            doc(
                "Moloko - The Time Is Now-GpvEJ_Gx0h4.mp3",
                "Moloko",
                "The Time Is Now",
                8,
            ),
            doc(
                "Nightmares On Wax - The Sweetest-km6QDpXqkRY.mp3",
                "Nightmares On Wax",
                "The Sweetest",
                4,
            ),
        ]);
        idx
    }

    #[test]
    fn test_phrase_match_wins() {
        let idx = index();
        let top = idx.top_match("waiting line").unwrap();
        assert_eq!(top.artist, "Zero 7");
    }

    #[test]
    fn test_case_insensitive() {
        let idx = index();
        assert_eq!(idx.top_match("MOLOKO").unwrap().artist, "Moloko");
    }

    #[test]
    fn test_rating_breaks_ties() {
        let idx = index();
        // "the" hits every document; highest rating wins.
        assert_eq!(idx.top_match("the").unwrap().artist, "Moloko");
    }

    #[test]
    fn test_no_results() {
        let idx = index();
        assert!(idx.top_match("polka").is_none());
        assert!(idx.search("").is_empty());
    }

    #[test]
    fn test_find_is_exact() {
        let idx = index();
        assert!(idx
            .find("Moloko - The Time Is Now-GpvEJ_Gx0h4.mp3")
            .is_some());
        assert!(idx.find("Moloko").is_none());
    }

    #[test]
    fn test_update_pos_and_rating() {
        let mut idx = index();
        let file = "Moloko - The Time Is Now-GpvEJ_Gx0h4.mp3";
        assert!(idx.update(file, 12, Some(9)));
        let doc = idx.find(file).unwrap();
        assert_eq!(doc.pos, 12);
        assert_eq!(doc.rating, 9);
        assert!(idx.update(file, 13, None));
        assert_eq!(idx.find(file).unwrap().rating, 9);
        assert!(!idx.update("missing.mp3", 0, None));
    }

    #[test]
    fn test_reindex_preserves_known_ratings() {
        let mut idx = index();
        let file = "Zero 7 - In The Waiting Line-5tZlu4wP4pw.mp3";
        idx.reindex(vec![doc(file, "Zero 7", "In The Waiting Line", -1)]);
        assert_eq!(idx.find(file).unwrap().rating, 6);
        assert_eq!(idx.len(), 1);

        idx.reindex(vec![doc(file, "Zero 7", "In The Waiting Line", RATING_DEFAULT)]);
        assert_eq!(idx.find(file).unwrap().rating, RATING_DEFAULT);
    }
}
