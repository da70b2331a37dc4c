//! PDF 텍스트 추출 모듈
//!
//! 본문은 pdf-extract, 문서 정보(Title/Author)는 lopdf로 읽습니다.

use anyhow::{Context, Result};
use lopdf::Object;

/// PDF에서 페이지별 텍스트 추출
///
/// 반환 벡터의 i번째 원소가 (i+1) 페이지입니다.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .context("Failed to extract text from PDF")?;

    // 페이지 분리가 안 된 경우 폼피드로 재시도
    if pages.len() == 1 && pages[0].contains('\x0c') {
        return Ok(split_pdf_pages(&pages[0]));
    }

    Ok(pages)
}

/// 폼피드 문자(\x0c)로 페이지 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    text.split('\x0c').map(|s| s.trim().to_string()).collect()
}

/// PDF 문서 정보
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: Option<usize>,
}

/// Info 딕셔너리에서 제목/저자, 페이지 트리에서 페이지 수 읽기
pub fn read_info(bytes: &[u8]) -> Result<PdfInfo> {
    let doc = lopdf::Document::load_mem(bytes).context("Failed to parse PDF structure")?;

    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| match obj {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|obj| obj.as_dict().ok());

    let field = |key: &[u8]| -> Option<String> {
        info.and_then(|dict| dict.get(key).ok())
            .and_then(|obj| match obj {
                Object::String(bytes, _) => Some(decode_pdf_text(bytes)),
                _ => None,
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    Ok(PdfInfo {
        title: field(b"Title"),
        author: field(b"Author"),
        page_count: Some(doc.get_pages().len()),
    })
}

/// PDF 텍스트 문자열 디코딩
///
/// BOM(FE FF)이 있으면 UTF-16BE, 아니면 UTF-8 시도 후 Latin-1.
fn decode_pdf_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "Page 1 content\x0cPage 2 content\x0cPage 3 content";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "Page 1 content");
        assert_eq!(pages[2], "Page 3 content");
    }

    #[test]
    fn test_split_keeps_blank_pages_for_numbering() {
        let pages = split_pdf_pages("one\x0c\x0cthree");
        assert_eq!(pages, vec!["one", "", "three"]);
    }

    #[test]
    fn test_decode_utf16_title() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_pdf_text(&bytes), "Hi");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode_pdf_text(&[0x43, 0x61, 0x66, 0xE9]), "Café");
        assert_eq!(decode_pdf_text(b"Perry"), "Perry");
    }

    #[test]
    fn test_read_info_rejects_garbage() {
        assert!(read_info(b"not a pdf").is_err());
    }
}
