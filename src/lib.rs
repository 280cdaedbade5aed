#![warn(missing_docs)]
//! Course catalog ingestion and semantic search over a Pinecone vector index.

pub mod api;
pub mod config;
pub mod course;
pub mod embedder;
pub mod ingest;
pub mod pinecone;
pub mod search;
pub mod vector_store;

pub use api::{router, AppState};
pub use config::{EmbedProvider, EmbedderArgs, IndexArgs};
pub use course::{load_courses, read_courses, CourseMetadata, CourseRecord};
pub use embedder::{Embedder, InputKind, RemoteOptions};
pub use ingest::{build_entries, prepare_index, upsert_entries, DuplicatePolicy, UpsertSummary};
pub use pinecone::{IndexDescription, IndexSpec, PineconeClient, PineconeIndex, ReadyPolicy};
pub use search::{SearchError, SearchLimits, SearchRequest, SearchResponse, SearchService};
pub use vector_store::{IndexEntry, IndexName, IndexStats, QueryMatch, VectorIndex};
