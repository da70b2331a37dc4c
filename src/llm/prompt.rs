//! 프롬프트 빌더

use crate::knowledge::SearchHit;

/// 시스템 지시문
pub fn system_instruction(subject: &str) -> String {
    format!(
        "You are an expert {subject} tutor. Explain concepts clearly and accurately, \
         show equations where they help, and keep units consistent."
    )
}

/// 검색된 청크로 답변하는 프롬프트
///
/// 각 청크는 `[Source i] {book}, Page {page}` 머리글 아래에 들어갑니다.
pub fn rag_prompt(subject: &str, question: &str, chunks: &[SearchHit]) -> String {
    let context = chunks
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[Source {}] {}, Page {}\n{}",
                i + 1,
                hit.book_name,
                hit.page,
                hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are answering a {subject} question using excerpts from textbooks.\n\n\
         Context from textbooks:\n\
         {context}\n\n\
         Question: {question}\n\n\
         Instructions:\n\
         1. Answer using only the information in the context above.\n\
         2. Cite the textbook for each fact in the form (Book Name, Page X).\n\
         3. If the context does not contain enough information, say so clearly \
         instead of guessing.\n\
         4. Use clear structure (short paragraphs, lists, or equations) where it helps.\n\n\
         Answer:"
    )
}

/// 교재 없이 일반 지식으로 답변하는 프롬프트
pub fn general_knowledge_prompt(subject: &str, question: &str) -> String {
    format!(
        "Answer the following {subject} question from your general expertise.\n\n\
         Question: {question}\n\n\
         Instructions:\n\
         1. Give an accurate, well-structured explanation.\n\
         2. Include relevant equations, typical values, or examples where useful.\n\
         3. Mention that the answer is based on general knowledge and is not drawn \
         from the course textbooks.\n\n\
         Answer:"
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Chunk;

    fn hit(book: &str, page: u32, text: &str) -> SearchHit {
        SearchHit::new(
            Chunk {
                id: Chunk::make_id(book, 0),
                chunk_index: 0,
                book_name: book.to_string(),
                page,
                source: String::new(),
                text: text.to_string(),
            },
            0.2,
        )
    }

    #[test]
    fn test_rag_prompt_numbers_sources() {
        let chunks = [
            hit("Perry", 12, "Raoult's law relates vapor pressure."),
            hit("McCabe", 400, "McCabe-Thiele diagrams."),
        ];
        let prompt = rag_prompt("Chemical Engineering", "What is Raoult's law?", &chunks);

        assert!(prompt.contains("[Source 1] Perry, Page 12\nRaoult's law relates vapor pressure."));
        assert!(prompt.contains("[Source 2] McCabe, Page 400"));
        assert!(prompt.contains("Question: What is Raoult's law?"));
        assert!(prompt.contains("(Book Name, Page X)"));
        assert!(prompt.find("[Source 1]") < prompt.find("[Source 2]"));
    }

    #[test]
    fn test_general_knowledge_prompt() {
        let prompt = general_knowledge_prompt("Thermodynamics", "Define entropy.");
        assert!(prompt.contains("Thermodynamics question"));
        assert!(prompt.contains("Question: Define entropy."));
        assert!(prompt.contains("not drawn from the course textbooks"));
        assert!(!prompt.contains("[Source"));
    }

    #[test]
    fn test_system_instruction_names_subject() {
        assert!(system_instruction("Process Control").contains("Process Control tutor"));
    }
}
