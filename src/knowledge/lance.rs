//! LanceDB Vector Store - 교재 청크 벡터 인덱스
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 교재 청크를 찾습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};

use super::chunker::Chunk;
use super::vector::{quote_literal, SearchHit, VectorEntry, VectorStore};
use crate::error::RagError;

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            dimension: dimension as i32,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    /// 벡터 테이블 스키마
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("book_name", DataType::Utf8, false),
            Field::new("page", DataType::Int32, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len != self.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: len,
            }
            .into());
        }
        Ok(())
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }
        for entry in entries {
            self.check_dimension(entry.embedding.len())?;
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.chunk.id.as_str()).collect();
        let books: Vec<&str> = entries.iter().map(|e| e.chunk.book_name.as_str()).collect();
        let pages: Vec<i32> = entries.iter().map(|e| e.chunk.page as i32).collect();
        let indices: Vec<i32> = entries.iter().map(|e| e.chunk.chunk_index as i32).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.chunk.source.as_str()).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(books)),
                Arc::new(Int32Array::from(pages)),
                Arc::new(Int32Array::from(indices)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<lancedb::table::Table>> {
        if !self.table_exists().await {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open chunks table")?;
        Ok(Some(table))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add vectors to table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(entries.len())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        book: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        self.check_dimension(query_embedding.len())?;

        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit);

        if let Some(book) = book {
            query = query.only_if(format!("book_name = {}", quote_literal(book)));
        }

        let batches: Vec<RecordBatch> = query
            .execute()
            .await
            .context("Failed to execute vector search")?
            .try_collect()
            .await?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(batch_to_hits(batch)?);
        }

        // 배치가 여러 개면 순서가 섞일 수 있음
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(hits)
    }

    async fn delete_book(&self, book_name: &str) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let filter = format!("book_name = {}", quote_literal(book_name));
        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for book")?;

        if before > 0 {
            table
                .delete(&filter)
                .await
                .context("Failed to delete vectors")?;
        }

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table.count_rows(None).await.context("Failed to count rows")
    }

    async fn has_book(&self, book_name: &str) -> Result<bool> {
        let Some(table) = self.open_table().await? else {
            return Ok(false);
        };

        let filter = format!("book_name = {}", quote_literal(book_name));
        let count = table
            .count_rows(Some(filter))
            .await
            .context("Failed to count rows for book")?;

        Ok(count > 0)
    }

    async fn book_names(&self) -> Result<Vec<String>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        // query()의 기본 limit(10)을 넘도록 전체 행 수로 제한
        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(vec![]);
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .select(Select::Columns(vec!["book_name".to_string()]))
            .limit(total)
            .execute()
            .await
            .context("Failed to query book names")?
            .try_collect()
            .await?;

        let mut names = std::collections::BTreeSet::new();
        for batch in &batches {
            let column = string_column(batch, "book_name")?;
            for i in 0..batch.num_rows() {
                names.insert(column.value(i).to_string());
            }
        }

        Ok(names.into_iter().collect())
    }

    async fn clear(&self) -> Result<()> {
        if self.table_exists().await {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop chunks table")?;
            tracing::info!("Vector table cleared");
        }
        Ok(())
    }
}

// ============================================================================
// RecordBatch Decoding
// ============================================================================

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

/// 검색 결과 배치를 SearchHit로 변환
fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let ids = string_column(batch, "id")?;
    let books = string_column(batch, "book_name")?;
    let pages = int_column(batch, "page")?;
    let indices = int_column(batch, "chunk_index")?;
    let sources = string_column(batch, "source")?;
    let texts = string_column(batch, "text")?;

    // _distance 컬럼 (LanceDB가 자동 추가)
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    Ok((0..batch.num_rows())
        .map(|i| {
            let chunk = Chunk {
                id: ids.value(i).to_string(),
                chunk_index: indices.value(i).max(0) as u32,
                book_name: books.value(i).to_string(),
                page: pages.value(i).max(0) as u32,
                source: sources.value(i).to_string(),
                text: texts.value(i).to_string(),
            };
            let distance = distances.map(|d| d.value(i)).unwrap_or(0.0);
            SearchHit::new(chunk, distance)
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn entry(book: &str, index: u32, page: u32, fill: f32) -> VectorEntry {
        VectorEntry {
            chunk: Chunk {
                id: Chunk::make_id(book, index),
                chunk_index: index,
                book_name: book.to_string(),
                page,
                source: format!("/books/{}.pdf", book),
                text: format!("{} chunk {}", book, index),
            },
            embedding: vec![fill; DIM],
        }
    }

    async fn open_store(dir: &TempDir) -> LanceVectorStore {
        LanceVectorStore::open(&dir.path().join("vectors.lance"), DIM)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[0.0; DIM], 5, None).await.unwrap().is_empty());
        assert!(store.book_names().await.unwrap().is_empty());
        assert_eq!(store.delete_book("none").await.unwrap(), 0);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let inserted = store
            .insert_batch(&[entry("Perry", 0, 1, 0.1), entry("Perry", 1, 2, 0.2)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        store.insert_batch(&[entry("McCabe", 0, 5, 0.9)]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        assert!(store.has_book("Perry").await.unwrap());
        assert!(!store.has_book("Missing").await.unwrap());
        assert_eq!(
            store.book_names().await.unwrap(),
            vec!["McCabe".to_string(), "Perry".to_string()]
        );
    }

    #[tokio::test]
    async fn test_book_names_scans_all_rows() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let entries: Vec<VectorEntry> = (0..15)
            .map(|i| entry(&format!("B{:02}", i), 0, 1, i as f32 / 15.0))
            .collect();
        store.insert_batch(&entries).await.unwrap();
        store
            .insert_batch(&[entry("B03", 1, 2, 0.5), entry("B03", 2, 3, 0.6)])
            .await
            .unwrap();

        let names = store.book_names().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 17);
        assert_eq!(names.len(), 15);
        assert_eq!(names.first().map(String::as_str), Some("B00"));
        assert_eq!(names.last().map(String::as_str), Some("B14"));
    }

    #[tokio::test]
    async fn test_search_nearest_first() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_batch(&[
                entry("Perry", 0, 1, 0.1),
                entry("Perry", 1, 2, 0.5),
                entry("McCabe", 0, 3, 0.9),
            ])
            .await
            .unwrap();

        let hits = store.search(&[0.88; DIM], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].book_name, "McCabe");
        assert_eq!(hits[0].page, 3);
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[tokio::test]
    async fn test_search_filtered_by_book() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_batch(&[
                entry("Perry", 0, 1, 0.1),
                entry("Smith's Notes", 0, 4, 0.9),
            ])
            .await
            .unwrap();

        let hits = store
            .search(&[0.9; DIM], 5, Some("Perry"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].book_name, "Perry");

        // 작은따옴표가 있는 이름도 필터 가능
        let hits = store
            .search(&[0.1; DIM], 5, Some("Smith's Notes"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_book_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_batch(&[
                entry("Perry", 0, 1, 0.1),
                entry("Perry", 1, 1, 0.1),
                entry("McCabe", 0, 1, 0.1),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_book("Perry").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        // 비운 뒤 다시 삽입 가능
        store.insert_batch(&[entry("Perry", 0, 1, 0.1)]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut bad = entry("Perry", 0, 1, 0.1);
        bad.embedding = vec![0.1; DIM + 1];
        assert!(store.insert_batch(&[bad]).await.is_err());
        assert!(store.search(&[0.1; 3], 5, None).await.is_err());
    }
}
