use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use super::{
    markdown::{
        block_paragraph, block_references, link_target, parse_frontmatter, split_frontmatter,
        wikilinks, with_frontmatter,
    },
    Frontmatter, FrontmatterEdit, Vault, VaultPath,
};
use crate::{error::DiscourseError, shapes::BLOCK_REF_PREFIX};

/// Case- and normalization-insensitive key for comparing link targets with file names.
fn link_key(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

fn block_id_for(target: &VaultPath) -> String {
    let digest = Sha256::digest(target.as_str().as_bytes());
    hex::encode(&digest[..4])
}

/// A vault backed by a directory of markdown files.
#[derive(Debug)]
pub struct MdVault {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl MdVault {
    pub fn new(root: &Path) -> Result<Self, DiscourseError> {
        if !root.is_dir() {
            return Err(DiscourseError::NotFound(format!(
                "Vault root {root:?} is not a directory"
            )));
        }
        Ok(MdVault {
            root: root.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn full_path(&self, file: &VaultPath) -> PathBuf {
        self.root.join(file.as_str())
    }

    fn relative(&self, path: &Path) -> Option<VaultPath> {
        let rel = path.strip_prefix(&self.root).ok()?;
        Some(VaultPath::new(&rel.to_string_lossy()))
    }

    fn markdown_files(&self) -> Vec<VaultPath> {
        let mut files: Vec<VaultPath> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map(|name| name.starts_with('.'))
                        .unwrap_or(false)
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
            .filter_map(|e| self.relative(e.path()))
            .collect();
        files.sort();
        files
    }

    fn resolve_link_sync(&self, link: &str, from: &VaultPath) -> Option<VaultPath> {
        let target = link_target(link);
        if target.is_empty() {
            return None;
        }
        let wanted = link_key(target.strip_suffix(".md").unwrap_or(target));
        let files = self.markdown_files();
        if target.contains('/') {
            return files
                .into_iter()
                .find(|f| link_key(f.without_extension()) == wanted);
        }
        let mut candidates: Vec<VaultPath> = files
            .into_iter()
            .filter(|f| link_key(f.basename()) == wanted)
            .collect();
        candidates.sort_by_key(|f| {
            (
                f.parent() != from.parent(),
                f.as_str().matches('/').count(),
                f.as_str().to_string(),
            )
        });
        candidates.into_iter().next()
    }

    async fn read_text_inner(&self, file: &VaultPath) -> Result<String, DiscourseError> {
        let path = self.full_path(file);
        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DiscourseError::NotFound(file.to_string()),
            _ => DiscourseError::from(e),
        })
    }

    async fn write_text_inner(&self, file: &VaultPath, text: &str) -> Result<(), DiscourseError> {
        let path = self.full_path(file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, text).await?;
        Ok(())
    }
}

#[async_trait]
impl Vault for MdVault {
    async fn resolve_file(
        &self,
        canvas: &VaultPath,
        token: &str,
    ) -> Result<Option<VaultPath>, DiscourseError> {
        let Some(block_id) = token.strip_prefix(BLOCK_REF_PREFIX) else {
            tracing::debug!("[MdVault] {token} is not a block reference");
            return Ok(None);
        };
        let text = self.read_text_inner(canvas).await?;
        let body = split_frontmatter(&text).body;
        let Some(paragraph) = block_paragraph(body, block_id) else {
            return Ok(None);
        };
        Ok(wikilinks(paragraph)
            .first()
            .and_then(|link| self.resolve_link_sync(link, canvas)))
    }

    #[tracing::instrument(skip_all)]
    async fn create_block_reference(
        &self,
        canvas: &VaultPath,
        target: &VaultPath,
    ) -> Result<String, DiscourseError> {
        let _guard = self.write_lock.lock().await;
        let text = self.read_text_inner(canvas).await?;
        let doc = split_frontmatter(&text);
        for (id, links) in block_references(doc.body) {
            let resolves = links
                .first()
                .and_then(|link| self.resolve_link_sync(link, canvas));
            if resolves.as_ref() == Some(target) {
                return Ok(format!("{BLOCK_REF_PREFIX}{id}"));
            }
        }
        let mut id = block_id_for(target);
        while block_paragraph(doc.body, &id).is_some() {
            id = block_id_for(&VaultPath::new(&format!("{}{id}", target.as_str())));
        }
        let link = self.link_text_sync(target, canvas);
        let head_end = doc.frontmatter_range.map(|r| r.end).unwrap_or(0);
        let updated = format!(
            "{}[[{link}]]\n^{id}\n\n{}",
            &text[..head_end],
            &text[head_end..]
        );
        self.write_text_inner(canvas, &updated).await?;
        tracing::debug!("[MdVault] Block reference ^{id} -> {target} added to {canvas}");
        Ok(format!("{BLOCK_REF_PREFIX}{id}"))
    }

    async fn read_frontmatter(&self, file: &VaultPath) -> Result<Frontmatter, DiscourseError> {
        let text = self.read_text_inner(file).await?;
        parse_frontmatter(&text)
    }

    async fn mutate_frontmatter(
        &self,
        file: &VaultPath,
        edit: FrontmatterEdit,
    ) -> Result<(), DiscourseError> {
        let _guard = self.write_lock.lock().await;
        let text = self.read_text_inner(file).await?;
        let mut frontmatter = parse_frontmatter(&text)?;
        edit(&mut frontmatter);
        let updated = with_frontmatter(&text, &frontmatter)?;
        if updated != text {
            self.write_text_inner(file, &updated).await?;
        }
        Ok(())
    }

    async fn resolve_link(
        &self,
        link: &str,
        from: &VaultPath,
    ) -> Result<Option<VaultPath>, DiscourseError> {
        Ok(self.resolve_link_sync(link, from))
    }

    async fn link_text(
        &self,
        file: &VaultPath,
        from: &VaultPath,
    ) -> Result<String, DiscourseError> {
        Ok(self.link_text_sync(file, from))
    }

    async fn read_text(&self, file: &VaultPath) -> Result<String, DiscourseError> {
        self.read_text_inner(file).await
    }

    async fn write_text(&self, file: &VaultPath, text: &str) -> Result<(), DiscourseError> {
        let _guard = self.write_lock.lock().await;
        self.write_text_inner(file, text).await
    }

    async fn exists(&self, file: &VaultPath) -> bool {
        tokio::fs::try_exists(self.full_path(file))
            .await
            .unwrap_or(false)
    }

    async fn files(&self, extension: &str) -> Result<Vec<VaultPath>, DiscourseError> {
        if extension == "md" {
            return Ok(self.markdown_files());
        }
        let mut files: Vec<VaultPath> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some(extension))
            .filter_map(|e| self.relative(e.path()))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl MdVault {
    /// The basename when it resolves back to `file`, else the full path without extension.
    fn link_text_sync(&self, file: &VaultPath, from: &VaultPath) -> String {
        let short = file.basename();
        if self.resolve_link_sync(short, from).as_ref() == Some(file) {
            short.to_string()
        } else {
            file.without_extension().to_string()
        }
    }
}
