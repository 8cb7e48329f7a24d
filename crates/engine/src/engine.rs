//! The template driver: per-call state setup, the script-block scan,
//! rewrite + evaluation of each block, include recursion and hook
//! invocation.

use crate::error::EngineError;
use crate::eval;
use crate::hooks::{Hook, HookContext, relative_url_hook};
use crate::literal;
use crate::resolve::{FsLoader, SourceLoader, resolve_include};
use crate::rewrite::{self, DOLLAR_METHODS, RewriteScope};
use crate::runtime::{
    DocState, ERR_UNCLOSED_CONDITIONAL, err_evaluation, err_include_unreadable,
    err_include_unresolved,
};
use crate::value::Value;
use hxp_dom::{Tokenizer, Tree, serialize};
use regex::Regex;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Include recursion guard; a cycle otherwise recurses until the stack
/// is gone.
const MAX_INCLUDE_DEPTH: usize = 64;

/// Constructor options.
pub struct Options {
    /// Constants seeded at the start of every `process` call.
    pub constants: Vec<(String, Value)>,
    /// Tag names that mark script blocks. The driver is symmetric
    /// across all of them.
    pub tag_names: Vec<String>,
    /// Anchor for root-relative include resolution; defaults to the
    /// per-call working directory.
    pub root_dir: Option<PathBuf>,
    pub pre_hooks: Vec<Hook>,
    pub post_hooks: Vec<Hook>,
    pub register_builtin_hooks: bool,
    /// Extra `$.name` properties; names must not collide with the
    /// reserved method set.
    pub extensions: Vec<(String, Value)>,
    pub loader: Box<dyn SourceLoader>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            constants: Vec::new(),
            tag_names: vec!["hxp".to_string(), "s_".to_string(), "script".to_string()],
            root_dir: None,
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            register_builtin_hooks: false,
            extensions: Vec::new(),
            loader: Box::new(FsLoader),
        }
    }
}

/// Per-call options.
#[derive(Default)]
pub struct ProcessOptions {
    /// Seed context variables for this call.
    pub context: Vec<(String, Value)>,
    /// Starting working directory; defaults to the input file's
    /// directory (path input) or the process cwd (inline source).
    pub cwd: Option<PathBuf>,
    /// Output-relative path handed to URL-rewriting hooks.
    pub rel_path: Option<String>,
    /// Hooks for this call only, run after the constructor-registered
    /// ones and dropped afterwards.
    pub pre_hooks: Vec<Hook>,
    pub post_hooks: Vec<Hook>,
}

struct EngineInner {
    constants: Vec<(String, Value)>,
    root_dir: Option<PathBuf>,
    pre_hooks: Vec<Hook>,
    post_hooks: Vec<Hook>,
    register_builtin_hooks: bool,
    extension_names: Vec<String>,
    shim_extra: String,
    loader: Box<dyn SourceLoader>,
    tokenizer: Tokenizer,
    tag_patterns: Vec<Regex>,
}

/// The preprocessor: turn one source document (markup plus script
/// blocks) into one static markup document.
#[derive(Clone)]
pub struct Preprocessor {
    inner: Rc<EngineInner>,
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor").finish_non_exhaustive()
    }
}

impl Preprocessor {
    pub fn new(options: Options) -> Result<Self, EngineError> {
        for (name, _) in &options.extensions {
            if DOLLAR_METHODS.contains(&name.as_str()) || name == "conditionalScope" {
                return Err(EngineError::ReservedExtension(name.clone()));
            }
        }
        let shim_extra = options
            .extensions
            .iter()
            .map(|(name, value)| format!("$.{name} = {};\n", literal::render(value)))
            .collect::<String>();
        let extension_names = options
            .extensions
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let tag_patterns = options
            .tag_names
            .iter()
            .map(|tag| {
                let escaped = regex::escape(tag);
                Regex::new(&format!(r"(?s)<{escaped}>(.*?)</{escaped}>"))
                    .expect("script tag pattern")
            })
            .collect();
        let tokenizer = Tokenizer::new(options.tag_names.iter().cloned());

        Ok(Self {
            inner: Rc::new(EngineInner {
                constants: options.constants,
                root_dir: options.root_dir,
                pre_hooks: options.pre_hooks,
                post_hooks: options.post_hooks,
                register_builtin_hooks: options.register_builtin_hooks,
                extension_names,
                shim_extra,
                loader: options.loader,
                tokenizer,
                tag_patterns,
            }),
        })
    }

    /// Process one input (a file path or inline source text, separated
    /// by heuristic) and return the final serialized document.
    pub fn process(&self, input: &str, options: ProcessOptions) -> Result<String, EngineError> {
        let (source, default_cwd) = if looks_like_source(input) {
            (input.to_string(), host_cwd())
        } else {
            let path = PathBuf::from(input);
            let source = self
                .inner
                .loader
                .read(&path)
                .map_err(|err| EngineError::Input {
                    path: input.to_string(),
                    source: err,
                })?;
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(host_cwd);
            (source, parent)
        };

        let cwd = options.cwd.unwrap_or(default_cwd);
        let root = self.inner.root_dir.clone().unwrap_or_else(|| cwd.clone());
        let rel_path = options.rel_path.unwrap_or_default();
        log::debug!("processing document (cwd {}, root {})", cwd.display(), root.display());

        let state = Rc::new(RefCell::new(DocState::new(cwd, root, rel_path)));
        {
            let mut st = state.borrow_mut();
            for (name, value) in &self.inner.constants {
                st.constants.push((name.clone(), value.clone()));
            }
            for (name, value) in options.context {
                st.set_context(&name, value);
            }
        }

        let job = Job {
            inner: Rc::clone(&self.inner),
            state: Rc::clone(&state),
            call_pre: Rc::new(options.pre_hooks),
            call_post: Rc::new(options.post_hooks),
        };
        job.run_document(&source);

        {
            let mut st = state.borrow_mut();
            if st.cond.is_open() {
                st.write_unconditional(ERR_UNCLOSED_CONDITIONAL);
            }
        }

        let main = std::mem::take(&mut state.borrow_mut().main);
        let mut tree = self.inner.tokenizer.parse(&main);
        job.run_post_hooks(&mut tree);
        Ok(serialize(&tree))
    }
}

/// One `process` call in flight. Cloned into the evaluator's include
/// callback so an include can re-enter the driver.
#[derive(Clone)]
struct Job {
    inner: Rc<EngineInner>,
    state: Rc<RefCell<DocState>>,
    call_pre: Rc<Vec<Hook>>,
    call_post: Rc<Vec<Hook>>,
}

impl Job {
    /// Steps 3–5 for one document: parse, pre-hooks, serialize, then
    /// interleave literal markup with block evaluation.
    fn run_document(&self, source: &str) {
        let mut tree = self.inner.tokenizer.parse(source);
        self.run_pre_hooks(&mut tree);
        let text = serialize(&tree);

        let mut pos = 0usize;
        while let Some((start, end, body)) = self.next_block(&text, pos) {
            if start > pos {
                self.state.borrow_mut().echo(&text[pos..start]);
            }
            self.eval_block(&body);
            pos = end;
        }
        if pos < text.len() {
            self.state.borrow_mut().echo(&text[pos..]);
        }
    }

    /// Earliest well-formed script-tag pair at or after `pos`, across
    /// all configured tag names.
    fn next_block(&self, text: &str, pos: usize) -> Option<(usize, usize, String)> {
        let mut best: Option<(usize, usize, String)> = None;
        for pattern in &self.inner.tag_patterns {
            if let Some(caps) = pattern.captures_at(text, pos) {
                let whole = caps.get(0).expect("match group");
                let body = caps.get(1).map_or("", |m| m.as_str());
                if best.as_ref().is_none_or(|(start, ..)| whole.start() < *start) {
                    best = Some((whole.start(), whole.end(), body.to_string()));
                }
            }
        }
        best
    }

    fn eval_block(&self, body: &str) {
        let (constants, context) = {
            let st = self.state.borrow();
            let constants: Vec<(String, String)> = st
                .constants
                .iter()
                .map(|(name, value)| (name.clone(), literal::render(value)))
                .collect();
            let context: Vec<(String, String)> = st
                .context
                .iter()
                .map(|(name, value)| (name.clone(), literal::render(value)))
                .collect();
            (constants, context)
        };
        let scope = RewriteScope {
            constants: &constants,
            context: &context,
            extensions: &self.inner.extension_names,
        };
        let fragment = rewrite::rewrite_block(body, &scope);
        log::trace!("rewritten block:\n{fragment}");

        let job = self.clone();
        let include = move |reference: &str, capture: bool| job.include(reference, capture);
        if let Err(message) = eval::eval_block(
            Rc::clone(&self.state),
            include,
            &self.inner.shim_extra,
            &fragment,
        ) {
            log::warn!("script block failed: {message}");
            self.state
                .borrow_mut()
                .write_unconditional(&err_evaluation(&message));
        }
    }

    /// `$.include`: three-tier resolution, shared document state,
    /// capture mode via buffer swap.
    fn include(&self, reference: &str, capture: bool) -> Option<String> {
        if !self.state.borrow().cond.show() {
            return None;
        }
        let (cwd, root, depth) = {
            let st = self.state.borrow();
            (st.cwd.clone(), st.root.clone(), st.include_depth)
        };
        if depth >= MAX_INCLUDE_DEPTH {
            let envelope =
                format!("<< Error: Include depth limit reached at '{reference}'. >>");
            self.state.borrow_mut().echo(&envelope);
            return Some(envelope);
        }

        let Some(path) = resolve_include(reference, &cwd, &root, self.inner.loader.as_ref())
        else {
            let envelope = err_include_unresolved(reference);
            log::warn!("include did not resolve: '{reference}' (cwd {})", cwd.display());
            self.state.borrow_mut().echo(&envelope);
            return Some(envelope);
        };
        let source = match self.inner.loader.read(&path) {
            Ok(source) => source,
            Err(err) => {
                log::warn!("include read failed for {}: {err}", path.display());
                let envelope = err_include_unreadable(&path.display().to_string());
                self.state.borrow_mut().echo(&envelope);
                return Some(envelope);
            }
        };
        log::debug!("including {} (capture: {capture})", path.display());

        let included_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.clone());
        let saved_main = {
            let mut st = self.state.borrow_mut();
            st.cwd = included_dir;
            st.include_depth += 1;
            capture.then(|| std::mem::take(&mut st.main))
        };

        self.run_document(&source);

        let mut st = self.state.borrow_mut();
        st.cwd = cwd;
        st.include_depth -= 1;
        saved_main.map(|saved| std::mem::replace(&mut st.main, saved))
    }

    fn run_pre_hooks(&self, tree: &mut Tree) {
        let st = self.state.borrow();
        let mut cx = HookContext {
            cwd: &st.cwd,
            tree,
            rel_path: &st.rel_path,
        };
        for hook in self.inner.pre_hooks.iter().chain(self.call_pre.iter()) {
            hook(&mut cx);
        }
    }

    fn run_post_hooks(&self, tree: &mut Tree) {
        let st = self.state.borrow();
        let mut cx = HookContext {
            cwd: &st.cwd,
            tree,
            rel_path: &st.rel_path,
        };
        if self.inner.register_builtin_hooks {
            let builtin = relative_url_hook();
            builtin(&mut cx);
        }
        for hook in self.inner.post_hooks.iter().chain(self.call_post.iter()) {
            hook(&mut cx);
        }
    }
}

fn host_cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Decide whether `process` got inline source or a file path.
///
/// Markup/script punctuation forces source; an extension plus a path
/// separator, or a recognizable OS path prefix, forces path; everything
/// ambiguous is treated as source.
fn looks_like_source(input: &str) -> bool {
    if input.contains(['{', '}', '<', '>', ';']) {
        return true;
    }
    let has_separator = input.contains('/') || input.contains('\\');
    let has_extension = Path::new(input).extension().is_some();
    if has_extension && has_separator {
        return false;
    }
    if input.starts_with('/')
        || input.starts_with("./")
        || input.starts_with("../")
        || input.starts_with("\\\\")
    {
        return false;
    }
    let bytes = input.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_heuristic() {
        assert!(looks_like_source("<p>hi</p>"));
        assert!(looks_like_source("let a = 1;"));
        assert!(looks_like_source("just words"));
        assert!(looks_like_source("page.hxp")); // extension but no separator
        assert!(!looks_like_source("site/page.hxp"));
        assert!(!looks_like_source("./page"));
        assert!(!looks_like_source("../up"));
        assert!(!looks_like_source("/abs/path"));
        assert!(!looks_like_source(r"C:\site\page.hxp"));
        assert!(!looks_like_source(r"\\share\page"));
    }

    #[test]
    fn reserved_extension_names_are_rejected() {
        let err = Preprocessor::new(Options {
            extensions: vec![("echo".to_string(), Value::Int(1))],
            ..Options::default()
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::ReservedExtension(name) if name == "echo"));
    }
}
