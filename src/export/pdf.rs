//! PDF 렌더러 (lopdf)
//!
//! US Letter, 1인치 여백, 표준 Type1 폰트(Helvetica 계열, WinAnsi).
//! 줄바꿈과 페이지 나눔은 글자 폭 근사치로 계산합니다.

use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

use super::{Block, ExportDocument};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const QUOTE_INDENT: f32 = 18.0;
const BULLET_INDENT: f32 = 14.0;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource(&self) -> &'static str {
        match self {
            Self::Regular => "F1",
            Self::Bold => "F2",
            Self::Italic => "F3",
        }
    }
}

// ============================================================================
// Layout
// ============================================================================

/// 페이지별 콘텐츠 연산 누적
struct Layout {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: vec![vec![]],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    /// 남은 높이가 부족하면 새 페이지
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.pages.push(vec![]);
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn gap(&mut self, height: f32) {
        self.y -= height;
    }

    /// 한 줄 출력 (x 위치 지정)
    fn line_at(&mut self, text: &str, font: Font, size: f32, x: f32) {
        let leading = size * 1.35;
        self.reserve(leading);
        self.y -= leading;

        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![font.resource().into(), size.into()]),
            Operation::new("Td", vec![x.into(), self.y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ];
        if let Some(page) = self.pages.last_mut() {
            page.extend(ops);
        }
    }

    /// 줄바꿈하여 문단 출력
    fn wrapped(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        for line in wrap_text(text, size, width) {
            self.line_at(&line, font, size, MARGIN + indent);
        }
    }

    fn block(&mut self, block: &Block) {
        match block {
            Block::Heading(text) => {
                self.gap(8.0);
                self.reserve(HEADING_SIZE * 3.0);
                self.wrapped(text, Font::Bold, HEADING_SIZE, 0.0);
                self.gap(4.0);
            }
            Block::Meta { label, value } => {
                self.wrapped(&format!("{}: {}", label, value), Font::Regular, BODY_SIZE, 0.0);
            }
            Block::Paragraph(text) => {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    self.wrapped(line.trim(), Font::Regular, BODY_SIZE, 0.0);
                }
                self.gap(6.0);
            }
            Block::Bullet(text) => {
                self.wrapped(&format!("- {}", text), Font::Regular, BODY_SIZE, BULLET_INDENT);
                self.gap(2.0);
            }
            Block::Quote(text) => {
                for line in text.lines().filter(|l| !l.trim().is_empty()) {
                    self.wrapped(line.trim(), Font::Italic, BODY_SIZE, QUOTE_INDENT);
                }
                self.gap(4.0);
            }
            Block::Spacer => self.gap(BODY_SIZE),
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// 문서를 PDF 바이트로 렌더링
pub fn render_pdf(document: &ExportDocument) -> Result<Vec<u8>> {
    let mut layout = Layout::new();

    // 제목 (가운데 정렬)
    for line in wrap_text(&document.title, TITLE_SIZE, PAGE_WIDTH - 2.0 * MARGIN) {
        let x = ((PAGE_WIDTH - text_width(&line, TITLE_SIZE)) / 2.0).max(MARGIN);
        layout.line_at(&line, Font::Bold, TITLE_SIZE, x);
    }
    layout.gap(12.0);

    for block in &document.blocks {
        layout.block(block);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font = |doc: &mut Document, base: &str| -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base,
            "Encoding" => "WinAnsiEncoding",
        })
    };
    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");
    let italic = font(&mut doc, "Helvetica-Oblique");

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => italic,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(layout.pages.len());
    for operations in layout.pages {
        let content = Content { operations };
        let stream = Stream::new(
            dictionary! {},
            content.encode().context("Failed to encode PDF content")?,
        );
        let content_id = doc.add_object(stream);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(encode_win_ansi(&document.title), StringFormat::Literal),
        "Producer" => Object::string_literal(concat!("textbook-rag ", env!("CARGO_PKG_VERSION"))),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).context("Failed to write PDF")?;
    Ok(bytes)
}

// ============================================================================
// Text Helpers
// ============================================================================

/// WinAnsi 인코딩 (Latin-1 밖의 문자는 '?')
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            c if (c as u32) < 0x100 && !c.is_control() => c as u8,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// Helvetica 글자 폭 근사 (1000 단위 em 기준 비율)
fn char_width(c: char) -> f32 {
    match c {
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' | ' ' => 0.28,
        'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' => 0.85,
        c if c.is_ascii_uppercase() => 0.68,
        _ => 0.56,
    }
}

fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(char_width).sum::<f32>() * size
}

/// 단어 단위 줄바꿈 (한 단어가 폭보다 길면 글자 단위로 자름)
fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if text_width(&candidate, size) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        // 긴 단어 분할
        let mut piece = String::new();
        for c in word.chars() {
            piece.push(c);
            if text_width(&piece, size) > max_width {
                piece.pop();
                lines.push(std::mem::take(&mut piece));
                piece.push(c);
            }
        }
        current = piece;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ============================================================================
// Tests
// ============================================================================
