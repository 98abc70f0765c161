// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{kubeconfig, KubeDirFixture, StaticChooser};

use anyhow::Result;
use kubecfg::{
    document::EMPTY_DOCUMENT, pointer::PointerError, Document, PointerState, Removal,
    Resolution, StoreError,
};
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn scan_skips_invalid_documents() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    fixture.write("good.yaml", kubeconfig(&[("a", "c", "u")], &["c"], &["u"]))?;
    fixture.write("bad.yaml", "this: [is not")?;
    fixture.write("cache/discovery.json", "{\"kind\": \"APIResourceList\"}")?;

    let registry = fixture.store().scan()?;

    assert_eq!(registry.names(), vec!["good.yaml"]);

    Ok(())
}

#[test]
fn new_document_refuses_existing_name() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    let store = fixture.store();
    let mut registry = store.scan()?;

    let candidate = store.new_document(&mut registry, "fresh.yaml")?;
    assert_eq!(candidate.name(), "fresh.yaml");
    assert_eq!(fs::read_to_string(fixture.path().join("fresh.yaml"))?, EMPTY_DOCUMENT);

    let result = store.new_document(&mut registry, "fresh.yaml");
    assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    assert_eq!(store.scan()?.names(), vec!["fresh.yaml"]);

    Ok(())
}

#[test]
fn delete_and_prune_explicit_file() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    let path = fixture.write(
        "work.yaml",
        kubeconfig(
            &[("ctx-1", "cluster-1", "user-1"), ("ctx-2", "cluster-2", "user-2")],
            &["cluster-1", "cluster-2", "cluster-3"],
            &["user-1", "user-2", "user-3"],
        ),
    )?;
    let store = fixture.store();
    let chooser = StaticChooser::new(None);

    let (name, context) =
        store.delete_context(Some(path.as_path()), Some("ctx-1"), Removal::Cascade, &chooser)?;
    assert_eq!(name, "ctx-1");
    assert_eq!(context.cluster, "cluster-1");

    let report = store.prune(Some(path.as_path()))?;
    assert_eq!(report.clusters, vec!["cluster-3"]);
    assert_eq!(report.users, vec!["user-3"]);

    let document = Document::load(&path)?;
    assert_eq!(document.context_names(), vec!["ctx-2"]);
    assert_eq!(document.clusters.keys().collect::<Vec<_>>(), vec!["cluster-2"]);
    assert_eq!(document.users.keys().collect::<Vec<_>>(), vec!["user-2"]);

    Ok(())
}

#[test]
fn delete_unknown_context_writes_nothing() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    let text = kubeconfig(&[("ctx", "c", "u")], &["c", "orphan"], &["u"]);
    let path = fixture.write("work.yaml", &text)?;
    let store = fixture.store();

    let result = store.delete_context(
        Some(path.as_path()),
        Some("nope"),
        Removal::Cascade,
        &StaticChooser::new(None),
    );

    assert!(matches!(result, Err(StoreError::ContextNotFound(name)) if name == "nope"));
    assert_eq!(fs::read_to_string(&path)?, text);

    Ok(())
}

#[test]
fn delete_context_through_chooser() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    let path = fixture.write(
        "work.yaml",
        kubeconfig(&[("ctx-a", "c", "u"), ("ctx-b", "c", "u")], &["c"], &["u"]),
    )?;
    let store = fixture.store();
    let chooser = StaticChooser::new(Some("ctx-b"));

    store.delete_context(Some(path.as_path()), None, Removal::Exclusive, &chooser)?;

    assert_eq!(
        chooser.shown(),
        Some((vec!["ctx-a".into(), "ctx-b".into()], Some("ctx-a".into())))
    );
    let document = Document::load(&path)?;
    assert_eq!(document.context_names(), vec!["ctx-a"]);
    assert!(document.clusters.contains_key("c"));
    assert!(document.users.contains_key("u"));

    Ok(())
}

#[test]
fn nothing_selected_changes_nothing() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    let text = kubeconfig(&[("ctx", "c", "u")], &["c"], &["u"]);
    let path = fixture.write("work.yaml", &text)?;
    let store = fixture.store();
    let chooser = StaticChooser::new(None);

    let result = store.delete_context(Some(path.as_path()), None, Removal::Cascade, &chooser);
    assert!(matches!(result, Err(StoreError::NothingSelected)));
    assert_eq!(fs::read_to_string(&path)?, text);

    let result = store.switch(None, &chooser);
    assert!(matches!(result, Err(StoreError::NothingSelected)));
    assert_eq!(store.pointer_state()?, PointerState::Absent);

    Ok(())
}

#[test]
fn switch_to_unknown_name_fails() -> Result<()> {
    let fixture = KubeDirFixture::new()?;
    fixture.write("a.yaml", kubeconfig(&[], &[], &[]))?;
    let store = fixture.store();

    let result = store.switch(Some("b.yaml"), &StaticChooser::new(None));

    assert!(matches!(
        result,
        Err(StoreError::Pointer(PointerError::NotFound(name))) if name == "b.yaml"
    ));
    assert_eq!(store.pointer_state()?, PointerState::Absent);

    Ok(())
}

#[cfg(unix)]
mod symlinked {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn switch_then_rescan_marks_selection() -> Result<()> {
        let fixture = KubeDirFixture::new()?;
        fixture.write("a.yaml", kubeconfig(&[("a", "c", "u")], &["c"], &["u"]))?;
        let b = fixture.write("team/b.yaml", kubeconfig(&[("b", "c", "u")], &["c"], &["u"]))?;
        let store = fixture.store();

        let name = store.switch(Some("b.yaml"), &StaticChooser::new(None))?;
        assert_eq!(name, "b.yaml");
        assert_eq!(
            store.pointer_state()?,
            PointerState::Linked(fs::canonicalize(&b)?)
        );

        let registry = store.scan()?;
        let selected = registry
            .iter()
            .filter(|candidate| candidate.is_selected())
            .map(|candidate| candidate.name().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(selected, vec!["b.yaml"]);
        assert_eq!(registry.names(), vec!["a.yaml", "b.yaml"]);

        Ok(())
    }

    #[test]
    fn interactive_switch_highlights_selection() -> Result<()> {
        let fixture = KubeDirFixture::new()?;
        fixture.write("a.yaml", kubeconfig(&[], &[], &[]))?;
        fixture.write("b.yaml", kubeconfig(&[], &[], &[]))?;
        let store = fixture.store();
        store.switch(Some("a.yaml"), &StaticChooser::new(None))?;

        let chooser = StaticChooser::new(Some("b.yaml"));
        store.switch(None, &chooser)?;

        assert_eq!(
            chooser.shown(),
            Some((vec!["a.yaml".into(), "b.yaml".into()], Some("a.yaml".into())))
        );
        assert_eq!(store.scan()?.selected().map(|c| c.name().to_owned()), Some("b.yaml".into()));

        Ok(())
    }

    #[test]
    fn delete_writes_through_pointer() -> Result<()> {
        let fixture = KubeDirFixture::new()?;
        let path = fixture.write(
            "work.yaml",
            kubeconfig(&[("ctx-1", "c-1", "u-1"), ("ctx-2", "c-2", "u-2")], &["c-1", "c-2"], &["u-1", "u-2"]),
        )?;
        let store = fixture.store();
        store.switch(Some("work.yaml"), &StaticChooser::new(None))?;

        store.delete_context(None, Some("ctx-2"), Removal::Cascade, &StaticChooser::new(None))?;

        assert!(fs::symlink_metadata(fixture.pointer_path())?.file_type().is_symlink());
        let document = Document::load(&path)?;
        assert_eq!(document.context_names(), vec!["ctx-1"]);
        assert_eq!(document.clusters.keys().collect::<Vec<_>>(), vec!["c-1"]);

        Ok(())
    }

    #[test]
    fn conflict_backup_then_switch() -> Result<()> {
        let fixture = KubeDirFixture::new()?;
        let original = kubeconfig(&[("old", "c", "u")], &["c"], &["u"]);
        fixture.write("config", &original)?;
        fixture.write("a.yaml", kubeconfig(&[], &[], &[]))?;
        let store = fixture.store();

        assert_eq!(store.pointer_state()?, PointerState::Conflict);
        let result = store.switch(Some("a.yaml"), &StaticChooser::new(None));
        assert!(matches!(
            result,
            Err(StoreError::Pointer(PointerError::Conflict(_)))
        ));

        let state = store.resolve_conflict(Resolution::Backup)?;
        let backup = fixture.path().join("config_kubecfg-backup");
        assert_eq!(state, PointerState::Linked(fs::canonicalize(&backup)?));
        assert_eq!(fs::read_to_string(&backup)?, original);

        // Backup is an ordinary candidate now.
        assert_eq!(store.scan()?.names(), vec!["a.yaml", "config_kubecfg-backup"]);

        store.switch(Some("a.yaml"), &StaticChooser::new(None))?;
        assert_eq!(
            store.pointer_state()?,
            PointerState::Linked(fs::canonicalize(fixture.path().join("a.yaml"))?)
        );

        Ok(())
    }

    #[test]
    fn prune_active_document() -> Result<()> {
        let fixture = KubeDirFixture::new()?;
        let path = fixture.write(
            "work.yaml",
            kubeconfig(&[("ctx", "c", "u")], &["c", "stale"], &["u", "stale"]),
        )?;
        let store = fixture.store();
        store.switch(Some("work.yaml"), &StaticChooser::new(None))?;

        let report = store.prune(None)?;

        assert_eq!(report.clusters, vec!["stale"]);
        assert_eq!(report.users, vec!["stale"]);
        let document = Document::load(&path)?;
        assert_eq!(document.clusters.keys().collect::<Vec<_>>(), vec!["c"]);

        Ok(())
    }

    #[test]
    fn shadowed_selection_is_not_highlighted() -> Result<()> {
        let fixture = KubeDirFixture::new()?;
        let shadowed = fixture.write("a/dev.yaml", kubeconfig(&[], &[], &[]))?;
        fixture.write("b/dev.yaml", kubeconfig(&[("b", "c", "u")], &["c"], &["u"]))?;
        std::os::unix::fs::symlink(&shadowed, fixture.pointer_path())?;
        let store = fixture.store();

        let registry = store.scan()?;
        let selected = registry.selected().expect("selected candidate");
        assert!(registry.is_shadowed(selected));

        let chooser = StaticChooser::new(None);
        let result = store.switch(None, &chooser);

        assert!(matches!(result, Err(StoreError::NothingSelected)));
        assert_eq!(chooser.shown(), Some((vec!["dev.yaml".into()], None)));

        Ok(())
    }
}
