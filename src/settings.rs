use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::course::CourseMeta;
use crate::error::{CourseError, Result};
use crate::narration::{DEFAULT_MAX_CHUNK_CHARS, DEFAULT_VOICE};
use crate::parser::pages::PageLimits;
use crate::parser::sections::{SegmentOptions, TitlePattern, DEFAULT_MIN_CHAPTER_CHARS};

pub const ENV_PREFIX: &str = "COURSEPACK";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub pagination: PageLimits,
    #[serde(default)]
    pub structure: StructureSettings,
    #[serde(default)]
    pub narration: NarrationSettings,
    #[serde(default)]
    pub courses: Vec<CourseSettings>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StructureSettings {
    pub min_chapter_chars: usize,
    pub promote_orphan_topics: bool,
}

impl Default for StructureSettings {
    fn default() -> Self {
        StructureSettings {
            min_chapter_chars: DEFAULT_MIN_CHAPTER_CHARS,
            promote_orphan_topics: true,
        }
    }
}

impl StructureSettings {
    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions {
            min_chapter_chars: self.min_chapter_chars,
            promote_orphan_topics: self.promote_orphan_topics,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NarrationSettings {
    pub voices: Vec<String>,
    pub default_voice: String,
    pub max_chunk_chars: usize,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        NarrationSettings {
            voices: vec![DEFAULT_VOICE.to_string()],
            default_voice: DEFAULT_VOICE.to_string(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

/// One course: its identity, its source text and its chapter-title table.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseSettings {
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub source: PathBuf,
    #[serde(default)]
    pub chapters: Vec<ChapterPattern>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterPattern {
    pub pattern: String,
    pub id: Option<String>,
    pub title: String,
}

impl CourseSettings {
    pub fn meta(&self) -> CourseMeta {
        CourseMeta {
            course_id: self.course_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }

    pub fn patterns(&self) -> Result<Vec<TitlePattern>> {
        self.chapters
            .iter()
            .map(|c| TitlePattern::new(&c.pattern, c.id.as_deref(), &c.title))
            .collect()
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/courses")
}

/// `COURSEPACK_PAGINATION__TARGET_WORDS=450` overrides `pagination.target_words`.
pub fn env_layer() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load a TOML file layered with `COURSEPACK_` environment overrides.
    pub fn load(path: &Path) -> Result<Settings> {
        Self::load_with_env(path, env_layer())
    }

    pub fn load_with_env(path: &Path, env: Environment) -> Result<Settings> {
        let cfg = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(env)
            .build()?;
        let mut settings: Settings = cfg.try_deserialize()?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        settings.resolve_paths(base);
        settings.validate()?;
        tracing::debug!(path = %path.display(), courses = settings.courses.len(), "settings loaded");
        Ok(settings)
    }

    /// Relative paths in the file are relative to the file's directory.
    fn resolve_paths(&mut self, base: &Path) {
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
        for course in &mut self.courses {
            if course.source.is_relative() {
                course.source = base.join(&course.source);
            }
        }
    }

    /// Everything that can be checked before any source file is read.
    pub fn validate(&self) -> Result<()> {
        self.pagination.validate()?;

        let narration = &self.narration;
        if narration.max_chunk_chars == 0 {
            return Err(invalid("narration.max_chunk_chars must be positive"));
        }
        if !narration.voices.contains(&narration.default_voice) {
            return Err(invalid(format!(
                "default voice `{}` is not among the configured voices",
                narration.default_voice
            )));
        }

        let mut seen = HashSet::new();
        for course in &self.courses {
            if course.course_id.is_empty() {
                return Err(invalid("course_id must not be empty"));
            }
            if !seen.insert(course.course_id.as_str()) {
                return Err(invalid(format!("duplicate course_id `{}`", course.course_id)));
            }
            course.patterns()?;
        }
        Ok(())
    }

    pub fn course(&self, course_id: &str) -> Option<&CourseSettings> {
        self.courses.iter().find(|c| c.course_id == course_id)
    }
}

fn invalid(message: impl Into<String>) -> CourseError {
    CourseError::Config(ConfigError::Message(message.into()))
}
