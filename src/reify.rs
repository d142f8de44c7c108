//! Reification: a canvas relation with both ends on linked nodes becomes a pair of wikilinks in
//! the frontmatter of the two backing files, under the relation type's id.
//!
//! Both files are resolved and read before anything is written, and when the second write fails
//! the first file is restored from what was read, so a pair is either fully present or untouched.

use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::sync::Arc;

use crate::{
    editor::{Editor, SharedEditor},
    error::DiscourseError,
    schema::{NodeTypeId, RelationTypeId, TypeSchema},
    shapes::ShapeId,
    toast::ToastSeverity,
    validator::resolve_direction_label,
    vault::{markdown::string_list, Frontmatter, Vault, VaultPath},
};

/// Frontmatter key holding a discourse node file's node type id.
pub const NODE_TYPE_KEY: &str = "nodeTypeId";

/// Everything reification needs from the editor, captured while it is locked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRequest {
    pub canvas: VaultPath,
    pub relation_id: ShapeId,
    pub relation_type_id: RelationTypeId,
    pub start_shape: ShapeId,
    pub end_shape: ShapeId,
    pub start_src: String,
    pub end_src: String,
}

impl RelationRequest {
    pub fn capture(editor: &Editor, relation_id: &ShapeId) -> Result<Self, DiscourseError> {
        let relation = editor
            .relation(relation_id)
            .ok_or_else(|| DiscourseError::NotFound(relation_id.to_string()))?;
        let (start, end) = editor.relation_endpoints(relation_id).ok_or_else(|| {
            DiscourseError::InvalidRelation(format!("{relation_id} is not bound at both ends"))
        })?;
        let src = |node: &crate::shapes::NodeShape| {
            node.props.src.clone().ok_or_else(|| {
                DiscourseError::Resolution(format!(
                    "\"{}\" is not linked to a file",
                    node.props.title
                ))
            })
        };
        Ok(RelationRequest {
            canvas: VaultPath::new(editor.canvas_id()),
            relation_id: relation_id.clone(),
            relation_type_id: relation.props.relation_type_id.clone(),
            start_shape: start.id.clone(),
            end_shape: end.id.clone(),
            start_src: src(start)?,
            end_src: src(end)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReifyReport {
    pub source: VaultPath,
    pub target: VaultPath,
    pub relation_type_id: RelationTypeId,
    /// False when both links were already present.
    pub changed: bool,
}

/// One relation link read back from a file's frontmatter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRelation {
    pub relation_type_id: RelationTypeId,
    /// Label or complement, as read from this file towards the target.
    pub text: String,
    pub link: String,
    pub target: Option<VaultPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkEdit {
    Add,
    Remove,
}

pub struct FrontmatterReifier {
    vault: Arc<dyn Vault>,
}

impl FrontmatterReifier {
    pub fn new(vault: Arc<dyn Vault>) -> Self {
        FrontmatterReifier { vault }
    }

    pub fn vault(&self) -> &Arc<dyn Vault> {
        &self.vault
    }

    /// Persist a completed relation. Failures post a toast on the relation's canvas (a warning
    /// when a file could not be resolved) and leave the canvas untouched so the user can retry.
    #[tracing::instrument(skip_all)]
    pub async fn reify(
        &self,
        editor: &SharedEditor,
        relation_id: &ShapeId,
    ) -> Result<ReifyReport, DiscourseError> {
        let result = self.reify_inner(editor, relation_id).await;
        if let Err(e) = result.as_ref() {
            let (title, description) = e.toast();
            let editor = editor.lock();
            match e.severity() {
                ToastSeverity::Error => editor.error(&title, &description),
                _ => editor.warn(&title, &description),
            }
        }
        result
    }

    async fn reify_inner(
        &self,
        editor: &SharedEditor,
        relation_id: &ShapeId,
    ) -> Result<ReifyReport, DiscourseError> {
        let request = {
            let editor = editor.lock();
            RelationRequest::capture(&editor, relation_id)?
        };
        let source = self.resolve(&request.canvas, &request.start_src).await?;
        let target = self.resolve(&request.canvas, &request.end_src).await?;

        // The canvas may have moved on while files were being resolved.
        let current = {
            let editor = editor.lock();
            RelationRequest::capture(&editor, relation_id)
        };
        if current.as_ref() != Ok(&request) {
            tracing::info!("[reify] {relation_id} changed during resolution, not writing");
            return Err(DiscourseError::StaleBinding(relation_id.to_string()));
        }
        self.link_files(&source, &target, &request.relation_type_id)
            .await
    }

    /// Reify every relation of the canvas that is bound at both ends.
    pub async fn reify_all(
        &self,
        editor: &SharedEditor,
    ) -> Vec<(ShapeId, Result<ReifyReport, DiscourseError>)> {
        let relation_ids: Vec<ShapeId> = {
            let editor = editor.lock();
            editor
                .relations()
                .filter(|r| editor.bindings_from(&r.id).is_complete())
                .map(|r| r.id.clone())
                .collect()
        };
        let mut results = Vec::new();
        for id in relation_ids {
            let result = self.reify(editor, &id).await;
            results.push((id, result));
        }
        results
    }

    async fn resolve(&self, canvas: &VaultPath, token: &str) -> Result<VaultPath, DiscourseError> {
        self.vault
            .resolve_file(canvas, token)
            .await?
            .ok_or_else(|| DiscourseError::Resolution(format!("{token} from {canvas}")))
    }

    /// Add `[[target]]` to the source's `relation_type_id` list and `[[source]]` to the
    /// target's. Links already present, by resolved file, are not duplicated.
    #[tracing::instrument(skip_all, fields(source = %source, target = %target))]
    pub async fn link_files(
        &self,
        source: &VaultPath,
        target: &VaultPath,
        relation_type_id: &RelationTypeId,
    ) -> Result<ReifyReport, DiscourseError> {
        let changed = self
            .edit_pair(source, target, relation_type_id, LinkEdit::Add)
            .await?;
        if changed {
            tracing::info!("[reify] {source} -[{relation_type_id}]- {target} written");
        }
        Ok(ReifyReport {
            source: source.clone(),
            target: target.clone(),
            relation_type_id: relation_type_id.clone(),
            changed,
        })
    }

    /// Remove the pair of links between two files.
    #[tracing::instrument(skip_all, fields(source = %source, target = %target))]
    pub async fn remove_relation(
        &self,
        source: &VaultPath,
        target: &VaultPath,
        relation_type_id: &RelationTypeId,
    ) -> Result<bool, DiscourseError> {
        self.edit_pair(source, target, relation_type_id, LinkEdit::Remove)
            .await
    }

    async fn edit_pair(
        &self,
        source: &VaultPath,
        target: &VaultPath,
        relation_type_id: &RelationTypeId,
        edit: LinkEdit,
    ) -> Result<bool, DiscourseError> {
        if source == target {
            return Err(DiscourseError::InvalidRelation(format!(
                "{source} cannot relate to itself"
            )));
        }
        // Read both before writing either.
        let source_text = self.vault.read_text(source).await?;
        self.vault.read_text(target).await?;
        let source_fm = self.vault.read_frontmatter(source).await?;
        let target_fm = self.vault.read_frontmatter(target).await?;
        let key = relation_type_id.as_str();

        let source_has = self.links_to(&source_fm, key, source, target).await?;
        let target_has = self.links_to(&target_fm, key, target, source).await?;
        let source_needs = needs_edit(edit, &source_has);
        let target_needs = needs_edit(edit, &target_has);
        if !source_needs && !target_needs {
            return Ok(false);
        }

        // Both link texts before the first write.
        let source_link = if source_needs {
            Some(self.vault.link_text(target, source).await?)
        } else {
            None
        };
        let target_link = if target_needs {
            Some(self.vault.link_text(source, target).await?)
        } else {
            None
        };

        if let Some(link) = source_link {
            self.vault
                .mutate_frontmatter(source, list_edit(key, edit, link, source_has))
                .await?;
        }
        if let Some(link) = target_link {
            if let Err(e) = self
                .vault
                .mutate_frontmatter(target, list_edit(key, edit, link, target_has))
                .await
            {
                tracing::error!("[reify] Writing {target} failed, restoring {source}: {e}");
                if source_needs {
                    self.vault.write_text(source, &source_text).await?;
                }
                return Err(e);
            }
        }
        Ok(true)
    }

    /// Indices of the entries under `key` in `file`'s frontmatter that resolve to `other`.
    async fn links_to(
        &self,
        frontmatter: &Frontmatter,
        key: &str,
        file: &VaultPath,
        other: &VaultPath,
    ) -> Result<Vec<usize>, DiscourseError> {
        let mut hits = Vec::new();
        for (idx, link) in string_list(frontmatter, key).iter().enumerate() {
            if self.vault.resolve_link(link, file).await?.as_ref() == Some(other) {
                hits.push(idx);
            }
        }
        Ok(hits)
    }

    /// The relation links stored in `file`, resolved to files where possible.
    pub async fn relations_of(
        &self,
        schema: &TypeSchema,
        file: &VaultPath,
    ) -> Result<Vec<FileRelation>, DiscourseError> {
        let frontmatter = self.vault.read_frontmatter(file).await?;
        let own_type = node_type_of(&frontmatter);
        let mut relations = Vec::new();
        for relation_type in schema.relation_types.iter() {
            for link in string_list(&frontmatter, relation_type.id.as_str()) {
                let target = self.vault.resolve_link(&link, file).await?;
                let mut text = relation_type.label.clone();
                if let (Some(own), Some(target)) = (own_type.as_ref(), target.as_ref()) {
                    let target_fm = self.vault.read_frontmatter(target).await?;
                    if let Some(other) = node_type_of(&target_fm) {
                        text = resolve_direction_label(schema, own, &other, &relation_type.id);
                    }
                }
                relations.push(FileRelation {
                    relation_type_id: relation_type.id.clone(),
                    text,
                    link,
                    target,
                });
            }
        }
        Ok(relations)
    }
}

fn node_type_of(frontmatter: &Frontmatter) -> Option<NodeTypeId> {
    frontmatter
        .get(NODE_TYPE_KEY)
        .and_then(YamlValue::as_str)
        .map(NodeTypeId::from)
}

fn needs_edit(edit: LinkEdit, existing: &[usize]) -> bool {
    match edit {
        LinkEdit::Add => existing.is_empty(),
        LinkEdit::Remove => !existing.is_empty(),
    }
}

fn list_edit(
    key: &str,
    edit: LinkEdit,
    link: String,
    existing: Vec<usize>,
) -> Box<dyn FnOnce(&mut Frontmatter) + Send> {
    let key = key.to_string();
    Box::new(move |frontmatter: &mut Frontmatter| {
        let mut list = string_list(frontmatter, &key);
        match edit {
            LinkEdit::Add => list.push(format!("[[{link}]]")),
            LinkEdit::Remove => {
                let mut idx = 0;
                list.retain(|_| {
                    let keep = !existing.contains(&idx);
                    idx += 1;
                    keep
                });
            }
        }
        if list.is_empty() {
            frontmatter.remove(key.as_str());
        } else {
            let seq = list.into_iter().map(YamlValue::String).collect();
            frontmatter.insert(YamlValue::String(key), YamlValue::Sequence(seq));
        }
    })
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::{
        tests::helpers::{claim_evidence_schema, drag, test_editor},
        toast::drain,
        tools::{RelationTool, RelationToolContext, ToolOutcome},
        vault::{FrontmatterEdit, MdVault},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;
    use tempfile::tempdir;
    use test_log::test;

    fn write(root: &Path, rel: &str, text: &str) {
        std::fs::write(root.join(rel), text).unwrap();
    }

    #[derive(Default)]
    struct Faults {
        /// `link_text` naming this file fails.
        link_text_to: Option<VaultPath>,
        /// Frontmatter writes to this file fail.
        write_to: Option<VaultPath>,
        /// Runs once, on the first `resolve_file`.
        on_resolve: Option<Box<dyn FnOnce() + Send>>,
    }

    /// An [MdVault] that fails where told to.
    struct FlakyVault {
        inner: MdVault,
        faults: Mutex<Faults>,
    }

    impl FlakyVault {
        fn new(root: &Path) -> Self {
            FlakyVault {
                inner: MdVault::new(root).unwrap(),
                faults: Mutex::new(Faults::default()),
            }
        }
    }

    #[async_trait]
    impl Vault for FlakyVault {
        async fn resolve_file(
            &self,
            canvas: &VaultPath,
            token: &str,
        ) -> Result<Option<VaultPath>, DiscourseError> {
            let hook = self.faults.lock().on_resolve.take();
            if let Some(hook) = hook {
                hook();
            }
            self.inner.resolve_file(canvas, token).await
        }

        async fn create_block_reference(
            &self,
            canvas: &VaultPath,
            target: &VaultPath,
        ) -> Result<String, DiscourseError> {
            self.inner.create_block_reference(canvas, target).await
        }

        async fn read_frontmatter(&self, file: &VaultPath) -> Result<Frontmatter, DiscourseError> {
            self.inner.read_frontmatter(file).await
        }

        async fn mutate_frontmatter(
            &self,
            file: &VaultPath,
            edit: FrontmatterEdit,
        ) -> Result<(), DiscourseError> {
            if self.faults.lock().write_to.as_ref() == Some(file) {
                return Err(DiscourseError::Io(format!("{file} is read-only")));
            }
            self.inner.mutate_frontmatter(file, edit).await
        }

        async fn resolve_link(
            &self,
            link: &str,
            from: &VaultPath,
        ) -> Result<Option<VaultPath>, DiscourseError> {
            self.inner.resolve_link(link, from).await
        }

        async fn link_text(
            &self,
            file: &VaultPath,
            from: &VaultPath,
        ) -> Result<String, DiscourseError> {
            if self.faults.lock().link_text_to.as_ref() == Some(file) {
                return Err(DiscourseError::Io("link index unavailable".to_string()));
            }
            self.inner.link_text(file, from).await
        }

        async fn read_text(&self, file: &VaultPath) -> Result<String, DiscourseError> {
            self.inner.read_text(file).await
        }

        async fn write_text(&self, file: &VaultPath, text: &str) -> Result<(), DiscourseError> {
            self.inner.write_text(file, text).await
        }

        async fn exists(&self, file: &VaultPath) -> bool {
            self.inner.exists(file).await
        }

        async fn files(&self, extension: &str) -> Result<Vec<VaultPath>, DiscourseError> {
            self.inner.files(extension).await
        }
    }

    #[test(tokio::test)]
    async fn linking_twice_keeps_one_entry_each() {
        let dir = tempdir().unwrap();
        write(dir.path(), "EVD - Whiskers.md", "---\nnodeTypeId: evidence\n---\n");
        write(dir.path(), "CLM - Cats.md", "---\nnodeTypeId: claim\nsupports:\n  - \"[[Unrelated]]\"\n---\nBody\n");
        let vault = Arc::new(MdVault::new(dir.path()).unwrap());
        let reifier = FrontmatterReifier::new(vault.clone());
        let evd = VaultPath::new("EVD - Whiskers.md");
        let clm = VaultPath::new("CLM - Cats.md");

        let first = reifier.link_files(&evd, &clm, &"supports".into()).await.unwrap();
        assert!(first.changed);
        let second = reifier.link_files(&clm, &evd, &"supports".into()).await.unwrap();
        assert!(!second.changed);

        let evd_fm = vault.read_frontmatter(&evd).await.unwrap();
        assert_eq!(string_list(&evd_fm, "supports"), vec!["[[CLM - Cats]]"]);
        let clm_fm = vault.read_frontmatter(&clm).await.unwrap();
        assert_eq!(
            string_list(&clm_fm, "supports"),
            vec!["[[Unrelated]]", "[[EVD - Whiskers]]"]
        );
        assert!(vault.read_text(&clm).await.unwrap().ends_with("Body\n"));

        let relations = reifier
            .relations_of(&claim_evidence_schema(), &clm)
            .await
            .unwrap();
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].target, None);
        assert_eq!(relations[1].target, Some(evd.clone()));
        assert_eq!(relations[1].text, "is supported by");
        let back = reifier
            .relations_of(&claim_evidence_schema(), &evd)
            .await
            .unwrap();
        assert_eq!(back[0].text, "supports");
    }

    #[test(tokio::test)]
    async fn removal_drops_both_links() {
        let dir = tempdir().unwrap();
        write(dir.path(), "A.md", "");
        write(dir.path(), "B.md", "");
        let vault = Arc::new(MdVault::new(dir.path()).unwrap());
        let reifier = FrontmatterReifier::new(vault.clone());
        let a = VaultPath::new("A.md");
        let b = VaultPath::new("B.md");
        reifier.link_files(&a, &b, &"supports".into()).await.unwrap();
        assert!(reifier.remove_relation(&b, &a, &"supports".into()).await.unwrap());
        assert!(vault.read_frontmatter(&a).await.unwrap().is_empty());
        assert!(vault.read_frontmatter(&b).await.unwrap().is_empty());
        assert!(!reifier.remove_relation(&a, &b, &"supports".into()).await.unwrap());
    }

    #[test(tokio::test)]
    async fn missing_target_writes_nothing() {
        let dir = tempdir().unwrap();
        write(dir.path(), "A.md", "Body\n");
        let vault = Arc::new(MdVault::new(dir.path()).unwrap());
        let reifier = FrontmatterReifier::new(vault.clone());
        let err = reifier
            .link_files(&"A.md".into(), &"Gone.md".into(), &"supports".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscourseError::NotFound(_)));
        assert_eq!(vault.read_text(&"A.md".into()).await.unwrap(), "Body\n");
    }

    #[test(tokio::test)]
    async fn unavailable_link_text_writes_neither_file() {
        let dir = tempdir().unwrap();
        write(dir.path(), "A.md", "Body A\n");
        write(dir.path(), "B.md", "Body B\n");
        let vault = Arc::new(FlakyVault::new(dir.path()));
        let a = VaultPath::new("A.md");
        let b = VaultPath::new("B.md");
        // The link written into B is the one that cannot be produced.
        vault.faults.lock().link_text_to = Some(a.clone());

        let reifier = FrontmatterReifier::new(vault.clone());
        let err = reifier
            .link_files(&a, &b, &"supports".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscourseError::Io(_)));
        assert_eq!(vault.read_text(&a).await.unwrap(), "Body A\n");
        assert_eq!(vault.read_text(&b).await.unwrap(), "Body B\n");
    }

    #[test(tokio::test)]
    async fn failed_second_write_restores_the_first_file() {
        let dir = tempdir().unwrap();
        let original = "---\nnodeTypeId: evidence\n---\nBody A\n";
        write(dir.path(), "A.md", original);
        write(dir.path(), "B.md", "Body B\n");
        let vault = Arc::new(FlakyVault::new(dir.path()));
        let a = VaultPath::new("A.md");
        let b = VaultPath::new("B.md");
        vault.faults.lock().write_to = Some(b.clone());

        let reifier = FrontmatterReifier::new(vault.clone());
        let err = reifier
            .link_files(&a, &b, &"supports".into())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscourseError::Io(_)));
        assert_eq!(vault.read_text(&a).await.unwrap(), original);
        assert!(vault
            .read_frontmatter(&b)
            .await
            .unwrap()
            .get("supports")
            .is_none());
    }

    #[test(tokio::test)]
    async fn binding_change_during_resolution_aborts() {
        let dir = tempdir().unwrap();
        write(dir.path(), "EVD - Rain.md", "---\nnodeTypeId: evidence\n---\n");
        write(dir.path(), "CLM - Wet.md", "---\nnodeTypeId: claim\n---\n");
        write(dir.path(), "Canvas.md", "");
        let vault = Arc::new(FlakyVault::new(dir.path()));
        let canvas = VaultPath::new("Canvas.md");

        let mut editor = test_editor();
        let mut toasts = editor.toasts().subscribe("Canvas.md");
        let evidence = editor.create_node(0.0, 0.0, 100.0, 100.0, "evidence".into(), "EVD - Rain");
        let claim = editor.create_node(300.0, 0.0, 100.0, 100.0, "claim".into(), "CLM - Wet");
        for (node, file) in [(&evidence, "EVD - Rain.md"), (&claim, "CLM - Wet.md")] {
            let token = vault
                .create_block_reference(&canvas, &file.into())
                .await
                .unwrap();
            editor.update_node(node, |node| node.props.src = Some(token));
        }
        let mut tool = RelationTool::new();
        tool.set_context(Some(RelationToolContext {
            relation_type_id: "supports".into(),
            source_file: None,
        }));
        let ToolOutcome::RelationCompleted(id) =
            drag(&mut tool, &mut editor, (50.0, 50.0), (350.0, 50.0))
        else {
            panic!("relation was not completed");
        };

        // The claim is unlinked while its file is being looked up.
        let editor = editor.into_shared();
        let canvas_editor = editor.clone();
        vault.faults.lock().on_resolve = Some(Box::new(move || {
            canvas_editor
                .lock()
                .update_node(&claim, |node| node.props.src = None);
        }));

        let reifier = FrontmatterReifier::new(vault.clone());
        let err = reifier.reify(&editor, &id).await.unwrap_err();
        assert!(matches!(err, DiscourseError::StaleBinding(_)));
        for file in ["EVD - Rain.md", "CLM - Wet.md"] {
            let frontmatter = vault.read_frontmatter(&file.into()).await.unwrap();
            assert!(frontmatter.get("supports").is_none());
        }
        let toasts = drain(&mut toasts);
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].severity, ToastSeverity::Warning);
        assert_eq!(toasts[0].title, "Relation changed");
    }
}
