//! Citation metadata carried by the generation stream.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Evidence backing one numbered `[n]` marker in generated content.
///
/// Field names match the `citation` frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Citation {
    /// Marker number, 1-based, unique within a session
    pub number: u32,
    /// Source document identifier in the knowledge base
    pub document_id: String,
    /// Human-readable document name
    pub document_name: String,
    /// Page in the source document, if paginated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Section heading the excerpt was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_header: Option<String>,
    /// Quoted source text
    #[serde(default)]
    pub excerpt: String,
    /// Start offset of the excerpt in the source document
    #[serde(default)]
    pub char_start: u64,
    /// End offset of the excerpt in the source document
    #[serde(default)]
    pub char_end: u64,
    /// Retrieval relevance (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl Citation {
    /// Create a citation with the required fields.
    pub fn new(
        number: u32,
        document_id: impl Into<String>,
        document_name: impl Into<String>,
    ) -> Self {
        Self {
            number,
            document_id: document_id.into(),
            document_name: document_name.into(),
            page_number: None,
            section_header: None,
            excerpt: String::new(),
            char_start: 0,
            char_end: 0,
            relevance_score: None,
        }
    }

    /// Set the quoted excerpt and its source offsets.
    pub fn with_excerpt(mut self, excerpt: impl Into<String>, start: u64, end: u64) -> Self {
        self.excerpt = excerpt.into();
        self.char_start = start;
        self.char_end = end;
        self
    }

    /// Set the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }

    /// Set the section header.
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section_header = Some(section.into());
        self
    }

    /// Set the relevance score, clamped to 0.0 - 1.0.
    pub fn with_relevance(mut self, score: f32) -> Self {
        self.relevance_score = Some(score.clamp(0.0, 1.0));
        self
    }

    /// Clamp out-of-range values received from upstream.
    ///
    /// Returns `true` if anything was adjusted.
    pub fn normalize(&mut self) -> bool {
        let mut adjusted = false;

        if let Some(score) = self.relevance_score {
            if score.is_nan() {
                self.relevance_score = None;
                adjusted = true;
            } else if !(0.0..=1.0).contains(&score) {
                self.relevance_score = Some(score.clamp(0.0, 1.0));
                adjusted = true;
            }
        }

        if self.char_end < self.char_start {
            std::mem::swap(&mut self.char_start, &mut self.char_end);
            adjusted = true;
        }

        adjusted
    }

    /// Short label for display, e.g. `"Security Handbook, p. 4"`.
    pub fn label(&self) -> String {
        match self.page_number {
            Some(page) => format!("{}, p. {}", self.document_name, page),
            None => self.document_name.clone(),
        }
    }
}
