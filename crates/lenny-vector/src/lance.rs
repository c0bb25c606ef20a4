//! LanceDB-backed segment index.
//!
//! One table holds both partitions; searches prefilter on the `partition`
//! column so each partition is ranked on its own.
use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType};
use std::sync::Arc;
use tracing::{debug, info};

use lenny_core::traits::{SegmentWriter, VectorIndex};
use lenny_core::types::{Partition, SearchHit, Segment};

pub fn build_segment_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("source_id", DataType::Utf8, false),
		Field::new("source_url", DataType::Utf8, true),
		Field::new("text", DataType::Utf8, false),
		Field::new("partition", DataType::Utf8, false),
		Field::new("position_index", DataType::Int32, false),
		Field::new("source_doc_length", DataType::Int32, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

pub struct LanceSegmentIndex { db: Connection, table_name: String, dim: i32 }

impl LanceSegmentIndex {
	pub async fn open(uri: &str, table_name: &str, dim: usize) -> Result<Self> {
		let db = connect(uri).execute().await?;
		let dim = i32::try_from(dim).map_err(|_| anyhow!("embedding dim {} too large", dim))?;
		Ok(Self { db, table_name: table_name.to_string(), dim })
	}

	fn segments_to_record_batch(&self, segments: &[Segment]) -> Result<RecordBatch> {
		let schema = build_segment_schema(self.dim);
		let mut ids = Vec::new(); let mut source_ids = Vec::new(); let mut urls: Vec<Option<String>> = Vec::new(); let mut texts = Vec::new(); let mut partitions = Vec::new(); let mut positions = Vec::new(); let mut lengths = Vec::new(); let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
		for s in segments {
			if s.embedding.len() != self.dim as usize { return Err(anyhow!("segment {} has dim {}, table expects {}", s.id, s.embedding.len(), self.dim)); }
			ids.push(s.id.clone()); source_ids.push(s.source_id.clone()); urls.push(s.source_url.clone()); texts.push(s.text.clone()); partitions.push(s.partition().as_str().to_string());
			positions.push(i32::try_from(s.position_index)?); lengths.push(i32::try_from(s.source_doc_length)?);
			vectors.push(Some(s.embedding.iter().map(|&x| Some(x)).collect()));
		}
		let record_batch = RecordBatch::try_new(schema, vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(StringArray::from(source_ids)),
			Arc::new(StringArray::from(urls)),
			Arc::new(StringArray::from(texts)),
			Arc::new(StringArray::from(partitions)),
			Arc::new(Int32Array::from(positions)),
			Arc::new(Int32Array::from(lengths)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), self.dim)),
		])?;
		Ok(record_batch)
	}
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("{} column missing", name))
}

#[async_trait]
impl VectorIndex for LanceSegmentIndex {
	async fn segment_count(&self) -> Result<usize> {
		let table = self.db.open_table(&self.table_name).execute().await?;
		Ok(table.count_rows(None).await?)
	}

	async fn search(&self, query: &[f32], partition: Partition, k: usize) -> Result<Vec<SearchHit>> {
		let table = self.db.open_table(&self.table_name).execute().await?;
		let mut stream = table.vector_search(query.to_vec())?
			.distance_type(DistanceType::Cosine)
			.only_if(format!("partition = '{}'", partition.as_str()))
			.limit(k)
			.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = string_col(&batch, "id")?; let source_ids = string_col(&batch, "source_id")?; let urls = string_col(&batch, "source_url")?; let texts = string_col(&batch, "text")?;
			let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("_distance column missing"))?;
			for i in 0..batch.num_rows() {
				let source_url = if urls.is_null(i) { None } else { Some(urls.value(i).to_string()) };
				hits.push(SearchHit { id: ids.value(i).to_string(), source_id: source_ids.value(i).to_string(), source_url, text: texts.value(i).to_string(), partition, score: 1.0 - distances.value(i) });
			}
		}
		hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
		debug!(%partition, k, hits = hits.len(), "lance search");
		Ok(hits)
	}
}

#[async_trait]
impl SegmentWriter for LanceSegmentIndex {
	async fn insert(&self, segments: &[Segment]) -> Result<()> {
		if segments.is_empty() { return Ok(()); }
		let record_batch = self.segments_to_record_batch(segments)?; let schema = record_batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
		if self.db.table_names().execute().await?.contains(&self.table_name) {
			let table = self.db.open_table(&self.table_name).execute().await?;
			let mut sources: Vec<&str> = segments.iter().map(|s| s.source_id.as_str()).collect();
			sources.sort_unstable(); sources.dedup();
			let list = sources.iter().map(|s| format!("'{}'", s.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
			table.delete(&format!("source_id IN ({})", list)).await?;
			let mut merge = table.merge_insert(&["id"]);
			merge.when_matched_update_all(None).when_not_matched_insert_all();
			merge.execute(reader).await?;
		} else {
			self.db.create_table(&self.table_name, reader).execute().await?;
		}
		info!(table = %self.table_name, segments = segments.len(), "inserted segments");
		Ok(())
	}
}
