#![doc = "drive-bucket-core: core pipeline library for drive-bucket."]

//! This crate contains the data model, contracts and pipeline for moving Drive folders
//! into an object-storage bucket. It performs no network I/O of its own: the remote store,
//! the uploader and the session provider are traits implemented by the binary crate (or
//! by mocks in tests).
//!
//! # Pipeline
//! [`listing`] selects folders, [`archive`] stages and zips one folder using [`fetch`],
//! [`transfer`] drives the whole run and names uploads with [`upload_key`].

pub mod archive;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod listing;
pub mod transfer;
pub mod upload_key;
