//! Quill - repository layer for a blog/CMS
//!
//! This library provides the storage clients, entity repositories and the
//! HTTP surface for the Quill blog backend.

pub mod api;
pub mod config;
pub mod db;
pub mod docstore;
pub mod models;
pub mod storage;
