use std::sync::Arc;

use thiserror::Error;

use rill_core::hash::hash_one;
use rill_core::UsageError;

/// Executable body of one page of the app.
pub type ScriptFn = Arc<dyn Fn() -> Result<(), UsageError> + Send + Sync>;

/// A resolved, compiled page ready for execution.
#[derive(Clone)]
pub struct ScriptPage {
    pub script_hash: String,
    pub name: String,
    pub body: ScriptFn,
}

impl ScriptPage {
    pub fn new(name: impl Into<String>, body: impl Fn() -> Result<(), UsageError> + Send + Sync + 'static) -> Self {
        let name = name.into();
        ScriptPage {
            script_hash: format!("{:016x}", hash_one(&name)),
            name,
            body: Arc::new(body),
        }
    }
}

impl std::fmt::Debug for ScriptPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptPage")
            .field("script_hash", &self.script_hash)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("failed to compile page `{page_name}`: {message}")]
    Compile { page_name: String, message: String },
}

/// Outcome of resolving a requested page.
pub enum PageLookup {
    Found(ScriptPage),
    /// The requested page does not exist; the session stays alive on the
    /// main page, and the client is told so it can show a not-found state.
    NotFound { fallback: ScriptPage },
}

/// External collaborator that resolves and compiles page scripts.
pub trait ScriptCache: Send + Sync {
    fn resolve(&self, page_script_hash: &str, page_name: &str) -> Result<PageLookup, CompileError>;
}

/// In-process page table: the main page plus any registered subpages.
pub struct PageRegistry {
    main: ScriptPage,
    pages: Vec<ScriptPage>,
}

impl PageRegistry {
    pub fn with_main(
        name: impl Into<String>,
        body: impl Fn() -> Result<(), UsageError> + Send + Sync + 'static,
    ) -> Self {
        PageRegistry {
            main: ScriptPage::new(name, body),
            pages: Vec::new(),
        }
    }

    pub fn add_page(
        &mut self,
        name: impl Into<String>,
        body: impl Fn() -> Result<(), UsageError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.pages.push(ScriptPage::new(name, body));
        self
    }

    pub fn main(&self) -> &ScriptPage {
        &self.main
    }
}

impl ScriptCache for PageRegistry {
    fn resolve(&self, page_script_hash: &str, page_name: &str) -> Result<PageLookup, CompileError> {
        if page_script_hash.is_empty() && page_name.is_empty() {
            return Ok(PageLookup::Found(self.main.clone()));
        }
        let found = std::iter::once(&self.main)
            .chain(self.pages.iter())
            .find(|page| page.script_hash == page_script_hash || page.name == page_name);
        match found {
            Some(page) => Ok(PageLookup::Found(page.clone())),
            None => Ok(PageLookup::NotFound {
                fallback: self.main.clone(),
            }),
        }
    }
}
