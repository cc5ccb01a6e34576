use slide_common::{ArchivedDeck, ChartRef, SlideDraft, SlideRecord, VisualStyle};
use thiserror::Error;

use crate::markdown::MarkdownAssembler;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeckError {
    #[error("slide {index} out of range (deck has {len} slides)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("a deck needs at least one slide")]
    LastSlide,
}

/// Partial update of a slide; `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct SlideEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    /// `Some(None)` clears the highlight.
    pub highlight: Option<Option<String>>,
}

/// Editable model handed to the editor once generation succeeds.
///
/// Every mutation re-assembles the markdown from the slide list.
#[derive(Debug, Clone)]
pub struct EditableDeck {
    topic: String,
    slides: Vec<SlideDraft>,
    markdown: String,
    archive_id: Option<String>,
    assembler: MarkdownAssembler,
}

impl EditableDeck {
    pub fn new(topic: impl Into<String>, slides: Vec<SlideDraft>, assembler: MarkdownAssembler) -> Self {
        let markdown = assembler.assemble(&slides);
        Self {
            topic: topic.into(),
            slides,
            markdown,
            archive_id: None,
            assembler,
        }
    }

    /// Wrap slides whose markdown was already assembled by the pipeline.
    pub fn from_generated(
        topic: impl Into<String>,
        slides: Vec<SlideDraft>,
        markdown: String,
        assembler: MarkdownAssembler,
    ) -> Self {
        Self {
            topic: topic.into(),
            slides,
            markdown,
            archive_id: None,
            assembler,
        }
    }

    /// Reopen a stored deck for editing, resolving mentions against the charts
    /// it was generated with.
    pub fn from_archived(archived: &ArchivedDeck) -> Self {
        let assembler = MarkdownAssembler::from_charts(archived.charts.clone());
        let mut deck = Self::new(archived.topic.clone(), archived.drafts(), assembler);
        deck.archive_id = Some(archived.id.clone());
        deck
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn slides(&self) -> &[SlideDraft] {
        &self.slides
    }

    pub fn markdown(&self) -> &str {
        &self.markdown
    }

    pub fn charts(&self) -> Vec<ChartRef> {
        self.assembler.charts()
    }

    pub fn archive_id(&self) -> Option<&str> {
        self.archive_id.as_deref()
    }

    pub fn set_archive_id(&mut self, id: impl Into<String>) {
        self.archive_id = Some(id.into());
    }

    pub fn records(&self) -> Vec<SlideRecord> {
        self.slides.iter().map(SlideRecord::from).collect()
    }

    pub fn update_slide(&mut self, index: usize, edit: SlideEdit) -> Result<(), DeckError> {
        let slide = self.slide_mut(index)?;
        if let Some(title) = edit.title {
            slide.title = title;
        }
        if let Some(content) = edit.content {
            slide.content = content;
        }
        if let Some(highlight) = edit.highlight {
            slide.highlight = highlight;
        }
        self.reassemble();
        Ok(())
    }

    pub fn set_layout(&mut self, index: usize, style: VisualStyle) -> Result<(), DeckError> {
        self.slide_mut(index)?.visual_style = Some(style);
        self.reassemble();
        Ok(())
    }

    pub fn move_slide(&mut self, from: usize, to: usize) -> Result<(), DeckError> {
        let len = self.slides.len();
        if from >= len {
            return Err(DeckError::IndexOutOfRange { index: from, len });
        }
        if to >= len {
            return Err(DeckError::IndexOutOfRange { index: to, len });
        }
        let slide = self.slides.remove(from);
        self.slides.insert(to, slide);
        self.reassemble();
        Ok(())
    }

    pub fn remove_slide(&mut self, index: usize) -> Result<SlideDraft, DeckError> {
        let len = self.slides.len();
        if index >= len {
            return Err(DeckError::IndexOutOfRange { index, len });
        }
        if len == 1 {
            return Err(DeckError::LastSlide);
        }
        let removed = self.slides.remove(index);
        self.reassemble();
        Ok(removed)
    }

    fn slide_mut(&mut self, index: usize) -> Result<&mut SlideDraft, DeckError> {
        let len = self.slides.len();
        self.slides
            .get_mut(index)
            .ok_or(DeckError::IndexOutOfRange { index, len })
    }

    fn reassemble(&mut self) {
        self.markdown = self.assembler.assemble(&self.slides);
    }
}
