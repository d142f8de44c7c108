//! Host vault contracts: resolving canvas block references to files, frontmatter access and raw
//! text I/O. [MdVault] implements them over a directory of markdown files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::DiscourseError;

pub mod markdown;
#[cfg(not(target_arch = "wasm32"))]
pub mod md;

#[cfg(not(target_arch = "wasm32"))]
pub use md::MdVault;

pub type Frontmatter = serde_yaml::Mapping;

/// Mutation applied by [Vault::mutate_frontmatter].
pub type FrontmatterEdit = Box<dyn FnOnce(&mut Frontmatter) + Send>;

/// A vault-relative file path with forward slashes, e.g. `notes/CLM - Cats.md`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultPath(String);

impl VaultPath {
    pub fn new(path: &str) -> Self {
        let path = path.replace('\\', "/");
        let path = path.trim_start_matches("./").trim_start_matches('/');
        VaultPath(path.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without directory and extension.
    pub fn basename(&self) -> &str {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        name.strip_suffix(".md").unwrap_or(name)
    }

    /// Directory part, empty at the vault root.
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// Path without the `.md` extension, as used in full-path wikilinks.
    pub fn without_extension(&self) -> &str {
        self.0.strip_suffix(".md").unwrap_or(&self.0)
    }
}

impl Display for VaultPath {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VaultPath {
    fn from(s: &str) -> Self {
        VaultPath::new(s)
    }
}

#[async_trait]
pub trait Vault: Send + Sync {
    /// Resolve a node shape's block-reference token through the canvas file's link index.
    async fn resolve_file(
        &self,
        canvas: &VaultPath,
        token: &str,
    ) -> Result<Option<VaultPath>, DiscourseError>;

    /// A token naming `target` from `canvas`, creating the block reference when needed.
    async fn create_block_reference(
        &self,
        canvas: &VaultPath,
        target: &VaultPath,
    ) -> Result<String, DiscourseError>;

    async fn read_frontmatter(&self, file: &VaultPath) -> Result<Frontmatter, DiscourseError>;

    /// Atomic read-modify-write of a file's frontmatter.
    async fn mutate_frontmatter(
        &self,
        file: &VaultPath,
        edit: FrontmatterEdit,
    ) -> Result<(), DiscourseError>;

    /// The file a wikilink target resolves to, seen from `from`.
    async fn resolve_link(
        &self,
        link: &str,
        from: &VaultPath,
    ) -> Result<Option<VaultPath>, DiscourseError>;

    /// The shortest wikilink target that resolves from `from` to `file`.
    async fn link_text(&self, file: &VaultPath, from: &VaultPath)
        -> Result<String, DiscourseError>;

    async fn read_text(&self, file: &VaultPath) -> Result<String, DiscourseError>;

    async fn write_text(&self, file: &VaultPath, text: &str) -> Result<(), DiscourseError>;

    async fn exists(&self, file: &VaultPath) -> bool;

    /// Every file with `extension`, in path order.
    async fn files(&self, extension: &str) -> Result<Vec<VaultPath>, DiscourseError>;
}
