// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manage many kubeconfig documents, with one of them active at a time.
//!
//! Kubectl reads a single kubeconfig file. Kubecfg keeps any number of
//! kubeconfig documents in a __store__, and makes one of them active by
//! pointing a symlink, the __selection pointer__, at it. Switching between
//! documents is just retargeting that symlink.
//!
//! Kubecfg can also clean up a document: delete a context together with the
//! cluster and user it used, or prune clusters and users that no context
//! references anymore.
//!
//! # Layout
//!
//! - [`document`] models a single kubeconfig document.
//! - [`cleanup`] removes contexts and orphaned records from a document.
//! - [`registry`] discovers documents on disk.
//! - [`pointer`] inspects and retargets the selection pointer.
//! - [`chooser`] asks the user to pick a name.
//! - [`store`] ties all of the above together.

pub mod chooser;
pub mod cleanup;
pub mod config;
pub mod document;
pub mod path;
pub mod pointer;
pub mod registry;
pub mod store;

pub use document::Document;
pub use pointer::{Pointer, PointerState, Resolution};
pub use registry::{Candidate, Registry};
pub use store::{Removal, Store, StoreError};
