//! Secondary index using Tantivy
//!
//! Documents are keyed by equipment id. Every write is a full replace:
//! delete-by-id and add in one commit under the writer lock.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use tantivy::{
    collector::TopDocs,
    directory::MmapDirectory,
    query::{Query, TermQuery},
    schema::{Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING, TEXT},
    tokenizer::TokenStream,
    DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument,
    Term,
};
use tracing::{debug, warn};

use crate::inventory::EquipmentId;

use super::document::EquipmentDoc;

pub const ID_FIELD: &str = "id";
pub const ACQUISITION_VALUE_FIELD: &str = "acquisition_value";
pub const ACQUISITION_DAY_FIELD: &str = "acquisition_day";

/// Schema fields of the equipment index
#[derive(Debug, Clone, Copy)]
pub struct EquipmentFields {
    pub id: Field,
    pub asset_number: Field,
    pub brand: Field,
    pub model: Field,
    pub responsible: Field,
    pub location: Field,
    pub description: Field,
    /// Untokenized status name, for exact filters
    pub status: Field,
    /// Untokenized type name, for exact filters
    pub equipment_type: Field,
    /// Untokenized location, for exact filters
    pub location_exact: Field,
    pub acquisition_value: Field,
    /// Acquisition date as a day number
    pub acquisition_day: Field,
    /// Serialized [`EquipmentDoc`], returned verbatim by searches
    pub source: Field,
}

/// Result ordering for [`EquipmentIndex::search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Score descending
    Relevance,
    /// Equipment id ascending
    Id,
}

/// A document returned by a search, with its score
#[derive(Debug, Clone)]
pub struct ScoredDoc {
    pub score: f32,
    pub document: EquipmentDoc,
}

/// Search index over equipment documents
pub struct EquipmentIndex {
    index: Index,
    reader: IndexReader,
    writer: parking_lot::Mutex<IndexWriter>,
    fields: EquipmentFields,
}

impl EquipmentIndex {
    /// Create a new index in memory
    pub fn new_in_memory(writer_heap_bytes: usize) -> Result<Self> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema);
        Self::from_index(index, fields, writer_heap_bytes)
    }

    /// Open or create an index on disk
    pub fn open(path: impl AsRef<Path>, writer_heap_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create index directory {}", path.display()))?;

        let (schema, fields) = Self::build_schema();
        let dir = MmapDirectory::open(path)?;
        let index = Index::open_or_create(dir, schema)?;
        Self::from_index(index, fields, writer_heap_bytes)
    }

    fn from_index(index: Index, fields: EquipmentFields, writer_heap_bytes: usize) -> Result<Self> {
        // Documents are committed one at a time; a single indexing thread
        // keeps the whole heap budget on that thread.
        let writer = index.writer_with_num_threads(1, writer_heap_bytes)?;
        // Reloaded explicitly after every commit so applied writes are
        // visible to the next query.
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            index,
            reader,
            writer: parking_lot::Mutex::new(writer),
            fields,
        })
    }

    fn build_schema() -> (Schema, EquipmentFields) {
        let mut builder = Schema::builder();

        let fields = EquipmentFields {
            id: builder.add_u64_field(ID_FIELD, INDEXED | STORED | FAST),
            asset_number: builder.add_text_field("asset_number", TEXT),
            brand: builder.add_text_field("brand", TEXT),
            model: builder.add_text_field("model", TEXT),
            responsible: builder.add_text_field("responsible", TEXT),
            location: builder.add_text_field("location", TEXT),
            description: builder.add_text_field("description", TEXT),
            status: builder.add_text_field("status", STRING),
            equipment_type: builder.add_text_field("type", STRING),
            location_exact: builder.add_text_field("location_exact", STRING),
            acquisition_value: builder.add_f64_field(ACQUISITION_VALUE_FIELD, INDEXED | FAST),
            acquisition_day: builder.add_i64_field(ACQUISITION_DAY_FIELD, INDEXED | FAST),
            source: builder.add_text_field("_source", STORED),
        };

        (builder.build(), fields)
    }

    pub fn fields(&self) -> &EquipmentFields {
        &self.fields
    }

    /// Write a document, replacing any prior document with the same id
    pub fn put(&self, doc: &EquipmentDoc) -> Result<()> {
        let tantivy_doc = self.to_tantivy(doc)?;
        let mut writer = self.writer.lock();

        let result = (|| -> Result<()> {
            writer.delete_term(self.id_term(doc.id));
            writer.add_document(tantivy_doc)?;
            writer.commit()?;
            Ok(())
        })();
        if let Err(e) = result {
            Self::discard_pending(&mut writer);
            return Err(e).with_context(|| format!("Failed to index document id={}", doc.id));
        }

        self.reader.reload()?;
        debug!("Indexed document id={}", doc.id);
        Ok(())
    }

    /// Remove the document with the given id. Removing a missing id succeeds.
    pub fn remove(&self, id: EquipmentId) -> Result<()> {
        let mut writer = self.writer.lock();

        writer.delete_term(self.id_term(id));
        if let Err(e) = writer.commit() {
            Self::discard_pending(&mut writer);
            return Err(e).with_context(|| format!("Failed to remove document id={}", id));
        }

        self.reader.reload()?;
        debug!("Removed document id={}", id);
        Ok(())
    }

    fn discard_pending(writer: &mut IndexWriter) {
        if let Err(e) = writer.rollback() {
            warn!("Index writer rollback failed: {}", e);
        }
    }

    /// Fetch a single document by id
    pub fn get(&self, id: EquipmentId) -> Result<Option<EquipmentDoc>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

        match top_docs.first() {
            Some((_, address)) => Ok(Some(self.load(&searcher, *address)?)),
            None => Ok(None),
        }
    }

    /// Number of live documents
    pub fn count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Ids of every live document, ascending
    pub fn ids(&self) -> Result<Vec<EquipmentId>> {
        let searcher = self.reader.searcher();
        let mut ids = Vec::with_capacity(searcher.num_docs() as usize);
        for segment in searcher.segment_readers() {
            let column = segment.fast_fields().u64(ID_FIELD)?;
            for doc in segment.doc_ids_alive() {
                ids.extend(column.first(doc));
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Run a query and load one page of matching documents
    pub fn search(
        &self,
        query: &dyn Query,
        offset: usize,
        limit: usize,
        order: SortOrder,
    ) -> Result<Vec<ScoredDoc>> {
        let limit = limit.max(1);
        anyhow::ensure!(
            offset.checked_add(limit).is_some(),
            "Result window overflows (offset={}, limit={})",
            offset,
            limit
        );
        let searcher = self.reader.searcher();
        let collector = TopDocs::with_limit(limit).and_offset(offset);

        let hits: Vec<(f32, DocAddress)> = match order {
            SortOrder::Relevance => searcher.search(query, &collector)?,
            SortOrder::Id => searcher
                .search(query, &collector.order_by_u64_field(ID_FIELD, Order::Asc))?
                .into_iter()
                .map(|(_, address)| (0.0, address))
                .collect(),
        };

        hits.into_iter()
            .map(|(score, address)| {
                Ok(ScoredDoc {
                    score,
                    document: self.load(&searcher, address)?,
                })
            })
            .collect()
    }

    /// Run `text` through the analyzer of `field`
    pub fn analyze(&self, field: Field, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        stream.process(&mut |token| tokens.push(token.text.clone()));
        Ok(tokens)
    }

    fn id_term(&self, id: EquipmentId) -> Term {
        Term::from_field_u64(self.fields.id, id)
    }

    fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<EquipmentDoc> {
        let doc: TantivyDocument = searcher.doc(address)?;
        let source = doc
            .get_first(self.fields.source)
            .and_then(|v| v.as_str())
            .context("Indexed document has no stored source")?;
        serde_json::from_str(source).context("Failed to decode stored document")
    }

    fn to_tantivy(&self, doc: &EquipmentDoc) -> Result<TantivyDocument> {
        let f = &self.fields;
        let mut out = TantivyDocument::new();

        out.add_u64(f.id, doc.id);
        if let Some(asset) = &doc.asset_number {
            out.add_text(f.asset_number, asset);
        }
        out.add_text(f.brand, &doc.brand);
        out.add_text(f.model, &doc.model);
        out.add_text(f.responsible, &doc.responsible);
        out.add_text(f.location, &doc.location);
        out.add_text(f.location_exact, &doc.location);
        out.add_text(f.description, &doc.description);
        out.add_text(f.status, &doc.status);
        out.add_text(f.equipment_type, &doc.equipment_type);
        if let Some(value) = doc.acquisition_value {
            out.add_f64(f.acquisition_value, value);
        }
        if let Some(date) = doc.acquisition_date {
            out.add_i64(f.acquisition_day, day_number(date));
        }
        out.add_text(f.source, serde_json::to_string(doc)?);

        Ok(out)
    }
}

/// Day number used to index calendar dates; preserves date ordering
pub fn day_number(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}
