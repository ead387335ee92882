use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::course::Course;
use crate::parser::blocks::collapse_whitespace;

pub const DEFAULT_VOICE: &str = "aria";
/// Longest piece of text handed to the speech engine in one request.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 5000;

/// Layout glyphs that read badly aloud.
const SILENT_GLYPHS: &[char] = &['•', '◦', '→', '✓'];
/// Symbols spoken as words. Padded so neighbours stay separate tokens.
const SPOKEN_SYMBOLS: &[(char, &str)] = &[('&', " and "), ('§', " section "), ('%', " percent ")];

static SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^.!?]+[.!?]+").unwrap());

/// Text for one audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarrationUnit {
    /// `{course_id}_{page_id}`; also the audio file stem.
    pub file_key: String,
    pub title: String,
    pub text: String,
    pub chunks: Vec<String>,
}

/// Where each voice's recording of each page lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioManifest {
    pub voices: Vec<String>,
    pub default_voice: String,
    pub audio: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

pub fn file_key(course_id: &str, page_id: &str) -> String {
    format!("{course_id}_{page_id}")
}

pub fn audio_path(voice: &str, file_key: &str) -> String {
    format!("/courses/audio/{voice}/{file_key}.mp3")
}

/// Page content as it should be read aloud.
pub fn speakable(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for c in content.chars() {
        if SILENT_GLYPHS.contains(&c) || is_private_use(c) {
            out.push(' ');
        } else if let Some((_, word)) = SPOKEN_SYMBOLS.iter().find(|(s, _)| *s == c) {
            out.push_str(word);
        } else {
            out.push(c);
        }
    }
    collapse_whitespace(&out)
}

fn is_private_use(c: char) -> bool {
    ('\u{e000}'..='\u{f8ff}').contains(&c)
}

/// Split at sentence ends into pieces of at most `max_chars` characters.
/// A single sentence longer than the limit is kept whole. Text the sentence
/// pattern skips (a leading run of punctuation) rides along with the next
/// sentence, so no characters are lost.
pub fn sentence_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut sentences: Vec<&str> = Vec::new();
    let mut consumed = 0;
    for m in SENTENCE_RE.find_iter(text) {
        sentences.push(&text[consumed..m.end()]);
        consumed = m.end();
    }
    let tail = &text[consumed..];
    if !tail.trim().is_empty() {
        sentences.push(tail);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        let len = current.chars().count() + sentence.chars().count();
        if len > max_chars && !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(sentence);
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

/// One narration unit per page, in page order.
pub fn narration_units(course: &Course, max_chunk_chars: usize) -> Vec<NarrationUnit> {
    course
        .pages
        .iter()
        .map(|page| {
            let text = speakable(&page.content);
            NarrationUnit {
                file_key: file_key(&course.course_id, &page.id),
                title: page.title.clone(),
                chunks: sentence_chunks(&text, max_chunk_chars),
                text,
            }
        })
        .collect()
}

impl AudioManifest {
    /// Map every recording found under `audio_dir/{voice}/{file_key}.mp3`.
    /// Voices with no recording of any page are left out.
    pub fn build(courses: &[Course], voices: &[String], default_voice: &str, audio_dir: &Path) -> AudioManifest {
        let mut found = Vec::new();
        let mut audio = BTreeMap::new();
        for voice in voices {
            let voice_dir = audio_dir.join(voice);
            let per_course: BTreeMap<String, BTreeMap<String, String>> = courses
                .iter()
                .map(|course| {
                    let pages = course
                        .pages
                        .iter()
                        .filter_map(|p| {
                            let key = file_key(&course.course_id, &p.id);
                            voice_dir
                                .join(format!("{key}.mp3"))
                                .is_file()
                                .then(|| (p.id.clone(), audio_path(voice, &key)))
                        })
                        .collect();
                    (course.course_id.clone(), pages)
                })
                .collect();
            let recordings: usize = per_course.values().map(BTreeMap::len).sum();
            if recordings == 0 {
                debug!(voice = %voice, dir = %voice_dir.display(), "no recordings; voice left out");
                continue;
            }
            found.push(voice.clone());
            audio.insert(voice.clone(), per_course);
        }
        AudioManifest {
            voices: found,
            default_voice: default_voice.to_string(),
            audio,
        }
    }

    pub fn recordings(&self) -> usize {
        self.audio.values().flat_map(BTreeMap::values).map(BTreeMap::len).sum()
    }
}
