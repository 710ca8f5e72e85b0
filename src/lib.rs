#![doc = "dataset-publisher: publication pipeline for external archival repositories."]

//! This crate contains the logic for pushing an internally held metadata
//! document and its files into a third-party archival repository: schema
//! translation, wire-level submission, checksum-verified file upload and
//! reconciliation of the local publication record on success or failure.
//! Begin new modules as submodules below.
//!
//! # Usage
//! Build a client via [`config::client_for`] and drive [`publish::publish`]
//! with implementations of the capability traits in [`contract`].

pub mod config;
pub mod contract;
pub mod dataverse;
pub mod error;
pub mod mapper;
pub mod publish;
pub mod record;
