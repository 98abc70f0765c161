// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reference graph cleanup.
//!
//! Contexts reference clusters and users by name, forming a many-to-one
//! graph inside a single [`Document`]. The functions here mutate that graph
//! in memory only. Persisting the result is left to the caller, so none of
//! them can fail.
//!
//! # Cascading Removal
//!
//! [`remove_context`] deletes a context together with the cluster and user
//! it referenced, __even if other contexts still reference them__. This
//! matches "delete this context and everything it used". Callers that need
//! shared records to survive should use [`remove_context_exclusive`] instead,
//! or run [`prune`] afterwards to clean up what is left dangling.

use crate::document::{Context, Document};

use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Remove context, and the cluster and user it references.
///
/// Does nothing if no context with the given name exists. The current
/// context of the document is left untouched even if it named the removed
/// context.
///
/// Returns the removed context record.
pub fn remove_context(document: &mut Document, name: &str) -> Option<Context> {
    let context = document.contexts.remove(name)?;
    debug!(
        "remove context {name:?} with cluster {:?} and user {:?}",
        context.cluster, context.user
    );
    document.clusters.remove(&context.cluster);
    document.users.remove(&context.user);

    Some(context)
}

/// Remove context, and the cluster and user only it references.
///
/// Unlike [`remove_context`], a cluster or user that is still referenced by
/// any remaining context is kept.
///
/// Returns the removed context record.
pub fn remove_context_exclusive(document: &mut Document, name: &str) -> Option<Context> {
    let context = document.contexts.remove(name)?;
    let cluster_used = document
        .contexts
        .values()
        .any(|other| other.cluster == context.cluster);
    let user_used = document
        .contexts
        .values()
        .any(|other| other.user == context.user);

    if !cluster_used {
        document.clusters.remove(&context.cluster);
    }

    if !user_used {
        document.users.remove(&context.user);
    }

    debug!(
        "remove context {name:?}, kept shared cluster: {cluster_used}, kept shared user: {user_used}"
    );

    Some(context)
}

/// Remove clusters that no context references.
///
/// Returns names of removed clusters in sorted order.
pub fn prune_orphaned_clusters(document: &mut Document) -> Vec<String> {
    let used = document
        .contexts
        .values()
        .map(|context| context.cluster.as_str())
        .collect::<HashSet<_>>();

    let removed = drain_unused(&mut document.clusters, &used);
    debug!("pruned orphaned clusters: {removed:?}");

    removed
}

/// Remove users that no context references.
///
/// Returns names of removed users in sorted order.
pub fn prune_orphaned_users(document: &mut Document) -> Vec<String> {
    let used = document
        .contexts
        .values()
        .map(|context| context.user.as_str())
        .collect::<HashSet<_>>();

    let removed = drain_unused(&mut document.users, &used);
    debug!("pruned orphaned users: {removed:?}");

    removed
}

/// Remove both orphaned clusters and orphaned users.
pub fn prune(document: &mut Document) -> PruneReport {
    PruneReport {
        clusters: prune_orphaned_clusters(document),
        users: prune_orphaned_users(document),
    }
}

/// Names of records removed by [`prune`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub clusters: Vec<String>,
    pub users: Vec<String>,
}

impl PruneReport {
    /// Check if nothing was removed.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.users.is_empty()
    }
}

// INVARIANT: Only keys are compared, so the membership set stays valid while draining.
fn drain_unused<V>(records: &mut BTreeMap<String, V>, used: &HashSet<&str>) -> Vec<String> {
    let removed = records
        .keys()
        .filter(|name| !used.contains(name.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    for name in &removed {
        records.remove(name);
    }

    removed
}
