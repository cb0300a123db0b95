//! Flattening of the Docs API document structure into plain text.

use serde::Deserialize;

/// Field mask requesting only the text runs of body paragraphs.
pub const TEXT_FIELDS_MASK: &str = "body(content(paragraph(elements(textRun(content)))))";

#[derive(Debug, Default, Deserialize)]
pub struct DocsDocument {
    #[serde(default)]
    body: Option<Body>,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    #[serde(default)]
    content: Option<Vec<StructuralElement>>,
}

#[derive(Debug, Default, Deserialize)]
struct StructuralElement {
    #[serde(default)]
    paragraph: Option<Paragraph>,
}

#[derive(Debug, Default, Deserialize)]
struct Paragraph {
    #[serde(default)]
    elements: Option<Vec<ParagraphElement>>,
}

#[derive(Debug, Default, Deserialize)]
struct ParagraphElement {
    #[serde(default, rename = "textRun")]
    text_run: Option<TextRun>,
}

#[derive(Debug, Default, Deserialize)]
struct TextRun {
    #[serde(default)]
    content: Option<String>,
}

impl DocsDocument {
    /// Concatenates every paragraph text run in document order. Tables, section
    /// breaks and other non-paragraph elements contribute nothing.
    pub fn plain_text(&self) -> String {
        let runs = self
            .body
            .iter()
            .filter_map(|body| body.content.as_ref())
            .flatten()
            .filter_map(|element| element.paragraph.as_ref())
            .filter_map(|paragraph| paragraph.elements.as_ref())
            .flatten()
            .filter_map(|element| element.text_run.as_ref())
            .filter_map(|run| run.content.as_deref());

        runs.collect()
    }
}
