use std::{collections::BTreeMap, ops::Range};

use anyhow::Context;
use quick_xml::{events::Event, Reader};

use crate::{
    config::{Course, StudentInfo},
    docx::xml::{escape_text, markup_range},
};

const TEXT_ELEMENT: &[u8] = b"w:t";
const PARAGRAPH_ELEMENT: &[u8] = b"w:p";

/// Token → value map. Tokens are stored without braces and matched as `{token}`.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: BTreeMap<String, String>,
}

#[derive(Debug)]
struct TokenMatch<'a> {
    range: Range<usize>,
    value: &'a str,
}

#[derive(Debug)]
struct TextNode {
    element: Range<usize>,
    text: String,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(token.into(), value.into());
        self
    }

    fn insert_student(&mut self, info: &StudentInfo) {
        self.insert("Name", &info.name)
            .insert("Program", &info.program)
            .insert("ASU_ID", &info.asu_id)
            .insert("UEL_ID", info.uel_id.to_string())
            .insert("Semester", &info.semester)
            .insert("AcademicYear", &info.academic_year)
            .insert("SubmissionDate", &info.submission_date);
    }

    fn insert_course_prefixed(&mut self, course: &Course) {
        self.insert("CourseASU_Name", &course.asu_name)
            .insert("CourseASU_Code", course.asu_code.to_string())
            .insert("CourseUEL_Name", &course.uel_name)
            .insert("CourseUEL_Code", course.uel_code.to_string());
    }

    /// Tokens replaced inside the report document.
    pub fn for_document(info: &StudentInfo, course: &Course) -> Self {
        let mut placeholders = Self::new();
        placeholders.insert_student(info);
        placeholders.insert_course_prefixed(course);
        placeholders
    }

    /// Tokens replaced in the output filename format. The document-style `Course*`
    /// tokens are accepted as aliases of the short ones.
    pub fn for_filename(info: &StudentInfo, course: &Course) -> Self {
        let mut placeholders = Self::new();
        placeholders.insert_student(info);
        placeholders
            .insert("ASU_Name", &course.asu_name)
            .insert("ASU_Code", course.asu_code.to_string())
            .insert("UEL_Name", &course.uel_name)
            .insert("UEL_Code", course.uel_code.to_string());
        placeholders.insert_course_prefixed(course);
        placeholders
    }

    /// Left-to-right, non-overlapping occurrences of known `{token}`s.
    fn find_tokens<'a>(&'a self, text: &str) -> Vec<TokenMatch<'a>> {
        let mut found = Vec::new();
        let mut cursor = 0;
        while let Some(open) = text[cursor..].find('{').map(|i| i + cursor) {
            let Some(close) = text[open + 1..].find('}').map(|i| i + open + 1) else {
                break;
            };
            match self.values.get(&text[open + 1..close]) {
                Some(value) => {
                    found.push(TokenMatch {
                        range: open..close + 1,
                        value: value.as_str(),
                    });
                    cursor = close + 1;
                }
                // `{` is one byte, so the next search starts on a char boundary
                None => cursor = open + 1,
            }
        }
        found
    }

    /// Single-pass replacement of every known token in plain text.
    pub fn substitute(&self, text: &str) -> String {
        let tokens = self.find_tokens(text);
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for token in tokens {
            out.push_str(&text[last..token.range.start]);
            out.push_str(token.value);
            last = token.range.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Replaces tokens inside WordprocessingML text nodes.
    ///
    /// Word often splits a typed `{Name}` across several runs. Text nodes of one
    /// paragraph are therefore searched as a whole: the value lands in the node that
    /// held the opening brace and the rest of the token is removed from the nodes it
    /// spilled into. Run formatting is left untouched.
    pub fn substitute_xml(&self, xml: &str) -> anyhow::Result<String> {
        let mut reader = Reader::from_str(xml);
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        let mut paragraph: Vec<TextNode> = Vec::new();
        // start offset and decoded content of the `<w:t>` being read
        let mut open_text: Option<(usize, String)> = None;

        loop {
            let event = reader.read_event().context("malformed WordprocessingML")?;
            let end = reader.buffer_position() as usize;
            match event {
                Event::Start(e) if e.name().as_ref() == TEXT_ELEMENT => {
                    open_text = Some((markup_range(xml, end).start, String::new()));
                }
                Event::Text(e) => {
                    if let Some((_, text)) = open_text.as_mut() {
                        text.push_str(&e.unescape()?);
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    TEXT_ELEMENT => {
                        if let Some((start, text)) = open_text.take() {
                            paragraph.push(TextNode {
                                element: start..end,
                                text,
                            });
                        }
                    }
                    PARAGRAPH_ELEMENT => self.rewrite_paragraph(&mut paragraph, &mut edits),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        self.rewrite_paragraph(&mut paragraph, &mut edits);

        if edits.is_empty() {
            return Ok(xml.to_owned());
        }
        let mut out = String::with_capacity(xml.len());
        let mut last = 0;
        for (range, replacement) in edits {
            out.push_str(&xml[last..range.start]);
            out.push_str(&replacement);
            last = range.end;
        }
        out.push_str(&xml[last..]);
        Ok(out)
    }

    fn rewrite_paragraph(&self, nodes: &mut Vec<TextNode>, edits: &mut Vec<(Range<usize>, String)>) {
        if nodes.is_empty() {
            return;
        }
        let full: String = nodes.iter().map(|n| n.text.as_str()).collect();
        let tokens = self.find_tokens(&full);
        if tokens.is_empty() {
            nodes.clear();
            return;
        }

        let mut offset = 0;
        let mut tokens = tokens.iter().peekable();
        for node in nodes.drain(..) {
            let mut rewritten = String::with_capacity(node.text.len());
            for (local, ch) in node.text.char_indices() {
                let at = offset + local;
                while tokens.peek().is_some_and(|t| t.range.end <= at) {
                    tokens.next();
                }
                match tokens.peek() {
                    Some(t) if t.range.start == at => rewritten.push_str(t.value),
                    Some(t) if t.range.contains(&at) => {}
                    _ => rewritten.push(ch),
                }
            }
            offset += node.text.len();
            if rewritten != node.text {
                edits.push((
                    node.element,
                    format!(
                        r#"<w:t xml:space="preserve">{}</w:t>"#,
                        escape_text(&rewritten)
                    ),
                ));
            }
        }
    }
}
