//! Integration tests for devdocs-ingest
//!
//! These tests use wiremock to serve manifests and pages and run the full
//! ingestion cycle end-to-end against an on-disk SQLite store.

mod ingest_tests;
