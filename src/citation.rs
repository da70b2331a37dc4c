//! 인용 포맷팅

/// 단일 인용 문자열
///
/// 페이지가 0이면 페이지 표기를 생략합니다.
pub fn format_citation(book_name: &str, page: u32) -> String {
    if page > 0 {
        format!("**{}** (Page {})", book_name, page)
    } else {
        format!("**{}**", book_name)
    }
}

/// 번호 붙은 인용 목록 (Markdown)
pub fn format_citations_list<'a, I>(sources: I) -> String
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    sources
        .into_iter()
        .enumerate()
        .map(|(i, (book, page))| format!("{}. {}", i + 1, format_citation(book, page)))
        .collect::<Vec<_>>()
        .join("\n")
}
