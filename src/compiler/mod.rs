//! Compiler: renders a parsed template against a data context
//!
//! The compiler walks the tree in document order, evaluating expressions
//! against a [`Scope`] chain and calling out to resolvers for components,
//! layouts and data. Everything it learns along the way is gathered into the
//! [`Output`] envelope next to the rendered markup.

mod config;
mod eval;
mod render;
mod scope;
mod value;

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use thiserror::Error;

use crate::error::Span;
use crate::parser::{Node, Root, Spanned};
use crate::resolver::{ComponentResolver, DataResolver, LayoutResolver, NullResolver, ResolveError};

pub use config::CompilerConfig;
pub use eval::evaluate;
pub use render::Flow;
pub use scope::Scope;
pub use value::Value;

use render::{route, Renderer};

/// Errors that abort a render
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("`{name}` exceeds the nesting limit of {limit} components and layouts")]
    RecursionLimit { name: String, limit: usize },

    /// A node that cannot be rendered where it was found
    #[error("cannot render {node} at {span:?}")]
    Unexpected { node: &'static str, span: Span },
}

/// Rendered markup plus what was learned while rendering it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Output {
    pub source: String,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Template files read and local `src`/`href` references
    pub files: IndexSet<String>,
    pub classes: IndexSet<String>,
    /// `<script src>` URLs
    pub scripts: IndexSet<String>,
    /// `<style>` bodies
    pub styles: IndexSet<String>,
    /// Rendered `meta`, `link`, `title` and `base` tags
    pub head: IndexSet<String>,
}

/// Renders templates; cheap to share across threads
pub struct Compiler {
    config: CompilerConfig,
    components: Arc<dyn ComponentResolver>,
    layouts: Arc<dyn LayoutResolver>,
    data: Arc<dyn DataResolver>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl Compiler {
    /// Compiler that resolves nothing until resolvers are plugged in
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            components: Arc::new(NullResolver),
            layouts: Arc::new(NullResolver),
            data: Arc::new(NullResolver),
        }
    }

    pub fn with_component_resolver(mut self, resolver: Arc<dyn ComponentResolver>) -> Self {
        self.components = resolver;
        self
    }

    pub fn with_layout_resolver(mut self, resolver: Arc<dyn LayoutResolver>) -> Self {
        self.layouts = resolver;
        self
    }

    pub fn with_data_resolver(mut self, resolver: Arc<dyn DataResolver>) -> Self {
        self.data = resolver;
        self
    }

    /// Render a node sequence. Break/continue outside a loop end the sequence.
    pub fn compile(&self, nodes: &[Spanned<Node>], context: &Value) -> Result<Output, CompileError> {
        let scope = Scope::root(context);
        let mut renderer = Renderer::new(self);
        let mut source = String::new();
        renderer.nodes(nodes, &scope, &mut source)?;
        Ok(renderer.finish(source))
    }

    /// Render a whole template, then wrap it in its layouts. The router is
    /// matched against `$url` in `context` where it appears in the document.
    pub fn compile_root(&self, root: &Root, context: &Value) -> Result<Output, CompileError> {
        let scope = Scope::root(context);
        let mut renderer = Renderer::new(self);
        let mut page = String::new();
        renderer.document(root, &scope, &mut page)?;
        let source = renderer.layouts(root, page, &scope)?;
        Ok(renderer.finish(source))
    }

    /// Render `root` for `url`; `None` when the template has no router or no
    /// path matches. `$url` is bound for the whole render.
    pub fn compile_route(
        &self,
        root: &Root,
        url: &str,
        context: &Value,
    ) -> Result<Option<Output>, CompileError> {
        let Some(router) = &root.router else {
            return Ok(None);
        };
        if route(&router.node, url).is_none() {
            return Ok(None);
        }

        let base = Scope::root(context);
        let mut bindings = IndexMap::new();
        bindings.insert("$url".to_string(), Value::from(url));
        let scope = base.child(bindings);

        let mut renderer = Renderer::new(self);
        let mut page = String::new();
        renderer.document(root, &scope, &mut page)?;
        let source = renderer.layouts(root, page, &scope)?;
        Ok(Some(renderer.finish(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::resolver::{DataRegistry, DataRequest, MemoryResolver, Outcome, RetryPolicy};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(source: &str, context: serde_json::Value) -> String {
        render_with(&Compiler::default(), source, context)
    }

    fn render_with(compiler: &Compiler, source: &str, context: serde_json::Value) -> String {
        let root = parse(source).expect("should parse");
        compiler
            .compile_root(&root, &Value::from(context))
            .expect("should compile")
            .source
    }

    fn components(templates: &[(&str, &str)]) -> Compiler {
        let resolver = templates
            .iter()
            .fold(MemoryResolver::new(), |resolver, (name, source)| {
                resolver.with_template(*name, *source)
            });
        let resolver = Arc::new(resolver);
        Compiler::default()
            .with_component_resolver(resolver.clone())
            .with_layout_resolver(resolver)
    }

    #[test]
    fn test_static_markup_round_trips() {
        let source = r#"<!DOCTYPE html><html><head><meta charset="utf-8"></head><body><!-- note --><p class="a b">Hi</p><br><input disabled></body></html>"#;
        assert_eq!(render(source, json!({})), source);
    }

    #[test]
    fn test_attribute_values() {
        assert_eq!(
            render(
                r#"<input a={none} b={missing} c={yes} d={no} e={n}>"#,
                json!({"none": null, "yes": true, "no": false, "n": 2.5})
            ),
            r#"<input b c d="false" e="2.5">"#
        );
    }

    #[test]
    fn test_break_keeps_partial_iteration() {
        let source = "{:each xs as x}<i>{x}</i>{:if x === 2}!{:break}?{/:if}-{/:each}";
        assert_eq!(
            render(source, json!({"xs": [1, 2, 3]})),
            "<i>1</i>-<i>2</i>!"
        );
    }

    #[test]
    fn test_continue_skips_rest_of_iteration() {
        let source = "{:each xs as x, i}{:if i === 1}{:continue}{/:if}{x}{/:each}";
        assert_eq!(render(source, json!({"xs": ["a", "b", "c"]})), "ac");
    }

    #[test]
    fn test_break_closes_open_tags() {
        let source = "{:each xs as x}<li><b>{x}{:break}</b></li>{/:each}";
        assert_eq!(render(source, json!({"xs": [1, 2]})), "<li><b>1</b></li>");
    }

    #[test]
    fn test_nested_each_break_is_local() {
        let source = "{:each rows as row}[{:each row as cell}{:if cell > 1}{:break}{/:if}{cell}{/:each}]{/:each}";
        assert_eq!(
            render(source, json!({"rows": [[1, 2, 3], [0, 5]]})),
            "[1][0]"
        );
    }

    #[test]
    fn test_each_over_object_and_fallback() {
        let source = "{:each m as v, k}{k}={v};{:else}empty{/:each}";
        assert_eq!(render(source, json!({"m": {"a": 1, "b": 2}})), "a=1;b=2;");
        assert_eq!(render(source, json!({"m": []})), "empty");
        assert_eq!(render(source, json!({})), "empty");
    }

    #[test]
    fn test_each_shadows_parent_binding() {
        let source = "{:each xs as title}{title}{/:each}/{title}";
        assert_eq!(render(source, json!({"xs": ["in"], "title": "out"})), "in/out");
    }

    #[test]
    fn test_when_uses_strict_equality() {
        let source = "{:when n}{:is 1}one{:is '2'}two{:else}other{/:when}";
        assert_eq!(render(source, json!({"n": 1})), "one");
        assert_eq!(render(source, json!({"n": "2"})), "two");
        assert_eq!(render(source, json!({"n": 2})), "other");
    }

    #[test]
    fn test_else_chain_and_skip() {
        let source = "{:if a}A{:elseif b}B{:else}C{/:if}{:skip a}S{/:skip}";
        assert_eq!(render(source, json!({"a": 1, "b": 1})), "A");
        assert_eq!(render(source, json!({"a": 0, "b": 1})), "BS");
        assert_eq!(render(source, json!({"a": "", "b": null})), "CS");
    }

    #[test]
    fn test_component_slots() {
        let compiler = components(&[(
            "card",
            r#"<section><h2><:slot name="title">Untitled</:slot></h2><:slot/></section>"#,
        )]);
        assert_eq!(
            render_with(
                &compiler,
                r#"<:component use="card"><span slot="title">{name}</span><p>body</p></:component>"#,
                json!({"name": "Ada"})
            ),
            "<section><h2><span>Ada</span></h2><p>body</p></section>"
        );
        assert_eq!(
            render_with(&compiler, r#"<:component use="card"/>"#, json!({})),
            "<section><h2>Untitled</h2></section>"
        );
    }

    #[test]
    fn test_component_attributes_are_bindings() {
        let compiler = components(&[("greet", "Hello {who}, {site}")]);
        assert_eq!(
            render_with(
                &compiler,
                r#"<:component use={kind} who="Ada"/>"#,
                json!({"kind": "greet", "site": "seed"})
            ),
            "Hello Ada, seed"
        );
    }

    #[test]
    fn test_element_forwards_attributes_to_first_tag() {
        let compiler = components(&[("button", r#"<button class="btn" type="button"><:slot/></button>"#)]);
        assert_eq!(
            render_with(
                &compiler,
                r#"<:element use="button" class="primary" disabled>Go</:element>"#,
                json!({})
            ),
            r#"<button class="primary" type="button" disabled>Go</button>"#
        );
    }

    #[test]
    fn test_break_does_not_cross_component() {
        let compiler = components(&[("stop", "x{:break}y")]);
        assert_eq!(
            render_with(
                &compiler,
                r#"{:each xs as v}<:component use="stop"/>{v}{/:each}"#,
                json!({"xs": [1, 2]})
            ),
            "x1x2"
        );
    }

    #[test]
    fn test_loop_control_in_caller_children_reaches_the_loop() {
        let compiler = components(&[("box", "[<:slot/>]")]);
        let context = json!({"xs": [1, 2, 3]});
        assert_eq!(
            render_with(
                &compiler,
                r#"{:each xs as x}<:component use="box">{x}{:if x === 2}{:continue}{/:if}!</:component>{/:each}"#,
                context.clone()
            ),
            "[1!][2][3!]"
        );
        assert_eq!(
            render_with(
                &compiler,
                r#"{:each xs as x}<:component use="box">{x}{:if x === 2}{:break}{/:if}!</:component>{/:each}"#,
                context
            ),
            "[1!][2]"
        );
    }

    #[test]
    fn test_call_directive_fills_named_slot() {
        let compiler = components(&[
            ("card", r#"<h1><:slot name="title"/></h1><main><:slot/></main>"#),
            ("badge", "<b>title</b>"),
        ]);
        assert_eq!(
            render_with(
                &compiler,
                r#"<:component use="card"><:component use="badge" slot="title"/>body</:component>"#,
                json!({})
            ),
            "<h1><b>title</b></h1><main>body</main>"
        );
    }

    #[test]
    fn test_recursion_limit() {
        let compiler = Compiler::new(CompilerConfig::default().with_max_depth(3))
            .with_component_resolver(Arc::new(
                MemoryResolver::new().with_template("loop", r#"<:component use="loop"/>"#),
            ));
        let root = parse(r#"<:component use="loop"/>"#).expect("should parse");
        let err = compiler.compile_root(&root, &Value::object()).unwrap_err();
        assert!(matches!(err, CompileError::RecursionLimit { limit: 3, .. }));
    }

    #[test]
    fn test_missing_component_is_an_error() {
        let root = parse(r#"<:component use="nope"/>"#).expect("should parse");
        let err = Compiler::default().compile_root(&root, &Value::object()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::Resolve(ResolveError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn test_layouts_wrap_page_innermost_first() {
        let compiler = components(&[
            ("inner", "<main><:slot/></main>"),
            ("outer", "<body>{title}<:slot/></body>"),
        ]);
        assert_eq!(
            render_with(
                &compiler,
                r#"<:layout use="inner"/><:layout use="outer" title={heading}/><p>page</p>"#,
                json!({"heading": "T"})
            ),
            "<body>T<main><p>page</p></main></body>"
        );
    }

    #[test]
    fn test_cache_counters() {
        let compiler = components(&[("dot", "<i></i>")]);
        let root = parse(r#"<:component use="dot"/><:component use="dot"/>"#).expect("should parse");
        let output = compiler.compile_root(&root, &Value::object()).expect("compiles");
        assert_eq!(output.cache_misses, 1);
        assert_eq!(output.cache_hits, 1);
    }

    #[test]
    fn test_data_scopes_following_siblings() {
        let registry = DataRegistry::new(RetryPolicy::default().with_retry_delay_ms(0))
            .register("echo", |request: &DataRequest<'_>| {
                Outcome::Success(Value::from(request.body.trim()))
            })
            .register("never", |_: &DataRequest<'_>| Outcome::Skip);
        let compiler = Compiler::default().with_data_resolver(Arc::new(registry));

        assert_eq!(
            render_with(
                &compiler,
                r#"<div><:data use="echo" key="msg">hi</:data>[{msg}]</div>"#,
                json!({})
            ),
            "<div>[hi]</div>"
        );
        assert_eq!(
            render_with(&compiler, r#"<p>a<:data use="never"/>b</p>"#, json!({})),
            "<p>a</p>"
        );
    }

    #[test]
    fn test_metadata_envelope() {
        let root = parse(
            r#"<head><title>T</title><link rel="stylesheet" href="/site.css"><script src="https://cdn.example/a.js"></script><style>p{color:red}</style></head><p class="x y">z</p><p class="x"></p>"#,
        )
        .expect("should parse");
        let output = Compiler::default()
            .compile_root(&root, &Value::object())
            .expect("compiles");

        let classes: Vec<&str> = output.classes.iter().map(String::as_str).collect();
        assert_eq!(classes, vec!["x", "y"]);
        assert!(output.scripts.contains("https://cdn.example/a.js"));
        assert!(output.styles.contains("p{color:red}"));
        assert!(output.files.contains("/site.css"));
        assert!(!output.files.contains("https://cdn.example/a.js"));
        let head: Vec<&str> = output.head.iter().map(String::as_str).collect();
        assert_eq!(
            head,
            vec!["<title>T</title>", r#"<link rel="stylesheet" href="/site.css">"#]
        );
    }

    #[test]
    fn test_routes() {
        let root = parse(
            r#"<nav>{$url}</nav><:router><:path url="/">home</:path><:path url="/u/:id">user {params.id}</:path></:router>"#,
        )
        .expect("should parse");
        let compiler = Compiler::default();
        let context = Value::object();

        let output = compiler
            .compile_route(&root, "/u/7", &context)
            .expect("compiles")
            .expect("matches");
        assert_eq!(output.source, "<nav>/u/7</nav>user 7");
        assert!(compiler.compile_route(&root, "/nope", &context).expect("compiles").is_none());

        let inline = Value::from(json!({"$url": "/"}));
        assert_eq!(
            compiler.compile_root(&root, &inline).expect("compiles").source,
            "<nav>/</nav>home"
        );
    }

    #[test]
    fn test_router_renders_in_document_order() {
        let root = parse(
            r#"<header></header><:router><:path url="/a">A</:path></:router><footer></footer>"#,
        )
        .expect("should parse");
        let context = Value::from(json!({"$url": "/a"}));
        let output = Compiler::default().compile_root(&root, &context).expect("compiles");
        assert_eq!(output.source, "<header></header>A<footer></footer>");

        let output = Compiler::default()
            .compile_route(&root, "/a", &Value::object())
            .expect("compiles")
            .expect("matches");
        assert_eq!(output.source, "<header></header>A<footer></footer>");
    }

    #[test]
    fn test_router_sees_preceding_data() {
        let registry = DataRegistry::new(RetryPolicy::default().with_retry_delay_ms(0))
            .register("site", |_: &DataRequest<'_>| Outcome::Success(Value::from("seed")));
        let compiler = Compiler::default().with_data_resolver(Arc::new(registry));
        let root = parse(r#"<:data use="site" key="name"/><:router><:path url="/">{name}</:path></:router>!"#)
            .expect("should parse");
        let output = compiler
            .compile_route(&root, "/", &Value::object())
            .expect("compiles")
            .expect("matches");
        assert_eq!(output.source, "seed!");
    }
}
