//! Tree-walking renderer
//!
//! Every render function appends to an output buffer and reports a [`Flow`],
//! which is how `{:break}` and `{:continue}` travel up to their `{:each}`.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::parser::ast::*;
use crate::resolver::{DataRequest, DataStatus, Resolved};

use super::eval::evaluate;
use super::scope::Scope;
use super::value::Value;
use super::{CompileError, Compiler, Output};

type Bindings = IndexMap<String, Value>;
type RenderResult = Result<Flow, CompileError>;

/// Tags whose rendered markup is also reported as head content
const HEAD_TAGS: &[&str] = &["meta", "link", "title", "base"];

/// How rendering continues after a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Normal,
    /// Skip the rest of the current iteration
    ContinueLoop,
    /// Leave the nearest enclosing `{:each}`
    BreakLoop,
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Component,
    Element,
    Layout,
}

impl Call {
    fn as_str(self) -> &'static str {
        match self {
            Call::Component => "component",
            Call::Element => "element",
            Call::Layout => "layout",
        }
    }
}

pub(crate) struct Renderer<'c> {
    compiler: &'c Compiler,
    output: Output,
    depth: usize,
    /// `<:element>` attributes waiting for the first tag of its template
    pending_attributes: Option<Bindings>,
}

impl<'c> Renderer<'c> {
    pub fn new(compiler: &'c Compiler) -> Self {
        Self {
            compiler,
            output: Output::default(),
            depth: 0,
            pending_attributes: None,
        }
    }

    pub fn finish(mut self, source: String) -> Output {
        self.output.source = source;
        self.output
    }

    /// Render a template's content with its router at `router_index`
    pub fn document(&mut self, root: &Root, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        let router = root
            .router
            .as_ref()
            .map(|router| (root.router_index, &router.node));
        self.sequence(&root.html, router, scope, out)
    }

    /// Render a child list; a `<:data>` directive scopes the siblings after it
    pub fn nodes(&mut self, nodes: &[Spanned<Node>], scope: &Scope<'_>, out: &mut String) -> RenderResult {
        self.sequence(nodes, None, scope, out)
    }

    fn sequence(
        &mut self,
        nodes: &[Spanned<Node>],
        router: Option<(usize, &RouterDirective)>,
        scope: &Scope<'_>,
        out: &mut String,
    ) -> RenderResult {
        for index in 0..=nodes.len() {
            if let Some((_, router)) = router.filter(|(at, _)| *at == index) {
                let flow = self.router(router, scope, out)?;
                if flow != Flow::Normal {
                    return Ok(flow);
                }
            }
            let Some(node) = nodes.get(index) else {
                break;
            };
            if let Node::Data(data) = &node.node {
                let rest = &nodes[index + 1..];
                let router = router
                    .filter(|(at, _)| *at > index)
                    .map(|(at, router)| (at - index - 1, router));
                return match self.data(data, scope)? {
                    Some(bindings) => self.sequence(rest, router, &scope.child(bindings), out),
                    None => Ok(Flow::Normal),
                };
            }
            let flow = self.node(node, scope, out)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn node(&mut self, node: &Spanned<Node>, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        match &node.node {
            Node::Doctype(doctype) => {
                out.push_str("<!");
                out.push_str(&doctype.data);
                out.push('>');
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(&comment.data);
                out.push_str("-->");
            }
            Node::Text(text) => out.push_str(&text.data),
            Node::Expression(expr) => out.push_str(&evaluate(expr, &node.span, scope).to_string()),
            Node::Tag(tag) => return self.tag(tag, scope, out),

            Node::Component(c) => {
                return self.call(Call::Component, &c.target, &c.attributes, &c.children, scope, out)
            }
            Node::Element(e) => {
                return self.call(Call::Element, &e.target, &e.attributes, &e.children, scope, out)
            }
            Node::Layout(l) => {
                return self.call(Call::Layout, &l.target, &l.attributes, &l.children, scope, out)
            }
            Node::Router(router) => return self.router(router, scope, out),
            Node::Path(_) => {
                return Err(CompileError::Unexpected {
                    node: "<:path>",
                    span: node.span.clone(),
                })
            }
            // Scopes its following siblings, so only child lists run it
            Node::Data(_) => {
                return Err(CompileError::Unexpected {
                    node: "<:data>",
                    span: node.span.clone(),
                })
            }
            Node::Slot(slot) => return self.slot(slot, scope, out),

            Node::If(block) => {
                return self.conditional(
                    &block.test,
                    &block.children,
                    block.alternate.as_deref(),
                    scope,
                    out,
                )
            }
            Node::Skip(block) => {
                if !value(&block.test, scope).is_truthy() {
                    return self.nodes(&block.children, scope, out);
                }
            }
            Node::When(block) => return self.when(block, scope, out),
            Node::Each(block) => return self.each(block, scope, out),
            Node::Break => return Ok(Flow::BreakLoop),
            Node::Continue => return Ok(Flow::ContinueLoop),
        }
        Ok(Flow::Normal)
    }

    // ============================================
    // Markup
    // ============================================

    fn tag(&mut self, tag: &Tag, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        let mut attributes = evaluate_attributes(&tag.attributes, scope);
        if let Some(pending) = self.pending_attributes.take() {
            attributes.extend(pending);
        }
        self.collect(tag, &attributes);

        let start = out.len();
        out.push('<');
        out.push_str(&tag.data);
        for (name, value) in &attributes {
            match value {
                Value::Null => {}
                Value::Undefined | Value::Bool(true) => {
                    out.push(' ');
                    out.push_str(name);
                }
                value => out.push_str(&format!(" {name}=\"{value}\"")),
            }
        }
        out.push('>');

        let flow = if tag.void {
            Flow::Normal
        } else {
            let body = out.len();
            // Close the tag even when break/continue unwinds through it
            let flow = self.nodes(&tag.children, scope, out)?;
            if tag.data.eq_ignore_ascii_case("style") && !out[body..].trim().is_empty() {
                self.output.styles.insert(out[body..].to_string());
            }
            out.push_str("</");
            out.push_str(&tag.data);
            out.push('>');
            flow
        };

        if HEAD_TAGS.iter().any(|name| tag.data.eq_ignore_ascii_case(name)) {
            self.output.head.insert(out[start..].to_string());
        }
        Ok(flow)
    }

    /// Record classes, scripts and local files referenced by a tag
    fn collect(&mut self, tag: &Tag, attributes: &Bindings) {
        if let Some(class) = attributes.get("class").filter(|v| is_present(v)) {
            for name in class.to_string().split_whitespace() {
                self.output.classes.insert(name.to_string());
            }
        }
        if tag.data.eq_ignore_ascii_case("script") {
            if let Some(src) = attributes.get("src").filter(|v| is_present(v)) {
                self.output.scripts.insert(src.to_string());
            }
        }
        for key in ["src", "href"] {
            if let Some(Value::String(target)) = attributes.get(key) {
                if is_local(target) {
                    self.output.files.insert(target.clone());
                }
            }
        }
    }

    // ============================================
    // Flow control
    // ============================================

    fn conditional(
        &mut self,
        test: &Spanned<Expr>,
        children: &[Spanned<Node>],
        alternate: Option<&ElseBranch>,
        scope: &Scope<'_>,
        out: &mut String,
    ) -> RenderResult {
        if value(test, scope).is_truthy() {
            return self.nodes(children, scope, out);
        }
        match alternate {
            None => Ok(Flow::Normal),
            Some(ElseBranch::ElseIf(link)) => self.conditional(
                &link.node.test,
                &link.node.children,
                link.node.alternate.as_deref(),
                scope,
                out,
            ),
            Some(ElseBranch::Else(link)) => self.nodes(&link.node.children, scope, out),
        }
    }

    fn when(&mut self, block: &WhenBlock, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        let discriminant = value(&block.discriminant, scope);
        for case in &block.cases {
            if value(&case.node.test, scope).strict_equals(&discriminant) {
                return self.nodes(&case.node.children, scope, out);
            }
        }
        match &block.fallback {
            Some(fallback) => self.nodes(&fallback.node.children, scope, out),
            None => Ok(Flow::Normal),
        }
    }

    fn each(&mut self, block: &EachBlock, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        let entries: Vec<(Value, Value)> = match value(&block.iterable, scope) {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (Value::Number(index as f64), item))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            Value::Undefined | Value::Null => Vec::new(),
            other => {
                warn!(kind = other.kind(), span = ?block.iterable.span, "each block over a value that is not iterable");
                Vec::new()
            }
        };

        if entries.is_empty() {
            return match &block.fallback {
                Some(fallback) => self.nodes(&fallback.node.children, scope, out),
                None => Ok(Flow::Normal),
            };
        }

        for (index, item) in entries {
            let mut bindings = Bindings::new();
            bindings.insert(block.context.node.0.clone(), item);
            if let Some(name) = &block.index {
                bindings.insert(name.node.0.clone(), index);
            }
            if self.nodes(&block.children, &scope.child(bindings), out)? == Flow::BreakLoop {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    // ============================================
    // Directives
    // ============================================

    fn call(
        &mut self,
        call: Call,
        target: &Spanned<Expr>,
        attributes: &[Spanned<Attribute>],
        children: &[Spanned<Node>],
        scope: &Scope<'_>,
        out: &mut String,
    ) -> RenderResult {
        let name = value(target, scope).to_string();
        let resolved = self.resolve(call, &name)?;
        let mut bindings = evaluate_attributes(attributes, scope);

        // Caller children render before the template, so they must not take
        // attributes meant for an outer element's first tag
        let outer = self.pending_attributes.take();
        let filled = self.fill_slots(children, scope);
        self.pending_attributes = outer;
        let (slots, flow) = filled?;
        bindings.insert("slots".to_string(), Value::Object(slots));

        if let Call::Element = call {
            let mut forwarded = bindings.clone();
            forwarded.shift_remove("slots");
            self.pending_attributes = Some(forwarded);
        }

        self.depth += 1;
        let rendered = self.nodes(&resolved.ast.html, &scope.child(bindings), out);
        self.depth -= 1;
        if let Call::Element = call {
            self.pending_attributes = None;
        }

        // Loop control raised inside the template stops here; the caller's
        // children belong to the caller's loop
        rendered?;
        Ok(flow)
    }

    fn resolve(&mut self, call: Call, name: &str) -> Result<Resolved, CompileError> {
        let compiler = self.compiler;
        let limit = compiler.config.max_depth;
        if self.depth >= limit {
            return Err(CompileError::RecursionLimit {
                name: name.to_string(),
                limit,
            });
        }

        let root = &compiler.config.root;
        let resolved = match call {
            Call::Layout => compiler.layouts.resolve(name, root)?,
            Call::Component | Call::Element => compiler.components.resolve(name, root)?,
        };
        debug!(kind = call.as_str(), name, cache_hit = resolved.cache_hit, "resolved template");

        self.count(resolved.cache_hit);
        if let Some(file) = &resolved.file {
            self.output.files.insert(file.display().to_string());
        }
        Ok(resolved)
    }

    /// Pre-render caller children into `slots.<name>`, in the caller's scope
    ///
    /// Stops at the first break or continue and reports it, keeping what was
    /// rendered before it.
    fn fill_slots(
        &mut self,
        children: &[Spanned<Node>],
        scope: &Scope<'_>,
    ) -> Result<(Bindings, Flow), CompileError> {
        let mut filled = IndexMap::new();
        let flow = self.collect_slots(children, scope, &mut filled)?;
        let slots = filled
            .into_iter()
            .filter(|(name, html)| name != "default" || !html.trim().is_empty())
            .map(|(name, html)| (name, Value::String(html)))
            .collect();
        Ok((slots, flow))
    }

    fn collect_slots(
        &mut self,
        children: &[Spanned<Node>],
        scope: &Scope<'_>,
        filled: &mut IndexMap<String, String>,
    ) -> RenderResult {
        for (index, child) in children.iter().enumerate() {
            let name = match &child.node {
                Node::Data(data) => {
                    return match self.data(data, scope)? {
                        Some(bindings) => {
                            self.collect_slots(&children[index + 1..], &scope.child(bindings), filled)
                        }
                        None => Ok(Flow::Normal),
                    };
                }
                Node::Tag(Tag { slot: Some(name), .. })
                | Node::Component(ComponentDirective { slot: Some(name), .. })
                | Node::Element(ElementDirective { slot: Some(name), .. }) => name.as_str(),
                _ => "default",
            };
            let mut html = String::new();
            let flow = self.node(child, scope, &mut html)?;
            filled.entry(name.to_string()).or_default().push_str(&html);
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn slot(&mut self, slot: &SlotDirective, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        let filled = scope
            .lookup("slots")
            .and_then(|slots| slots.property(&Value::from(slot.name.as_str())));
        match filled {
            Some(content) if is_present(&content) => {
                out.push_str(&content.to_string());
                Ok(Flow::Normal)
            }
            _ => self.nodes(&slot.children, scope, out),
        }
    }

    /// Run a data directive; `None` means the processor asked to skip
    fn data(&mut self, data: &DataDirective, scope: &Scope<'_>) -> Result<Option<Bindings>, CompileError> {
        let compiler = self.compiler;
        let processor = value(&data.processor, scope).to_string();
        let attributes = evaluate_attributes(&data.attributes, scope);
        let request = DataRequest {
            processor: &processor,
            attributes: &attributes,
            body: &data.body,
            root: &compiler.config.root,
            file_id: compiler.config.file_id.as_deref(),
        };
        let result = compiler.data.resolve(&request)?;
        debug!(
            processor = %processor,
            status = ?result.status,
            retries = result.retries,
            cache_hit = result.cache_hit,
            "data resolved"
        );
        self.count(result.cache_hit);

        if result.status == DataStatus::Skip {
            return Ok(None);
        }
        let mut bindings = Bindings::new();
        bindings.insert(data.key.clone(), result.response);
        Ok(Some(bindings))
    }

    /// Inline router, matched against `$url`
    fn router(&mut self, router: &RouterDirective, scope: &Scope<'_>, out: &mut String) -> RenderResult {
        let Some(url) = scope.lookup("$url").map(|url| url.to_string()) else {
            debug!("router without $url in context");
            return Ok(Flow::Normal);
        };
        match route(router, &url) {
            Some((path, params)) => self.path(path, params, scope, out),
            None => Ok(Flow::Normal),
        }
    }

    fn path(
        &mut self,
        path: &PathDirective,
        params: Bindings,
        scope: &Scope<'_>,
        out: &mut String,
    ) -> RenderResult {
        let mut bindings = Bindings::new();
        bindings.insert("params".to_string(), Value::Object(params));
        self.nodes(&path.children, &scope.child(bindings), out)
    }

    /// Wrap `page` in each root-level layout, innermost first
    pub fn layouts(&mut self, root: &Root, page: String, scope: &Scope<'_>) -> Result<String, CompileError> {
        let Some(layouts) = &root.layout else {
            return Ok(page);
        };

        let mut page = page;
        for layout in layouts {
            let directive = &layout.node;
            let name = value(&directive.target, scope).to_string();
            let resolved = self.resolve(Call::Layout, &name)?;

            // Root-level layouts sit outside any loop
            let (mut slots, _) = self.fill_slots(&directive.children, scope)?;
            slots.insert("default".to_string(), Value::String(page));
            let mut bindings = evaluate_attributes(&directive.attributes, scope);
            bindings.insert("slots".to_string(), Value::Object(slots));

            self.depth += 1;
            let wrapped = self.wrap(&resolved.ast, bindings, scope);
            self.depth -= 1;
            page = wrapped?;
        }
        Ok(page)
    }

    /// Render a layout template, then any layouts it declares itself
    fn wrap(&mut self, ast: &Root, bindings: Bindings, scope: &Scope<'_>) -> Result<String, CompileError> {
        let mut html = String::new();
        self.nodes(&ast.html, &scope.child(bindings), &mut html)?;
        self.layouts(ast, html, scope)
    }

    fn count(&mut self, cache_hit: bool) {
        if cache_hit {
            self.output.cache_hits += 1;
        } else {
            self.output.cache_misses += 1;
        }
    }
}

fn value(expr: &Spanned<Expr>, scope: &Scope<'_>) -> Value {
    evaluate(&expr.node, &expr.span, scope)
}

fn is_present(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Undefined)
}

/// Evaluate an attribute list into a name-keyed map; later names overwrite earlier ones
fn evaluate_attributes(attributes: &[Spanned<Attribute>], scope: &Scope<'_>) -> Bindings {
    let mut map = Bindings::new();
    for attribute in attributes {
        match &attribute.node {
            Attribute::Static { name, value } => {
                let value = value.clone().map_or(Value::Bool(true), Value::String);
                map.insert(name.clone(), value);
            }
            Attribute::Expression { name, value: expr } => {
                map.insert(name.clone(), value(expr, scope));
            }
            Attribute::Spread(expr) => match value(expr, scope) {
                Value::Object(entries) => map.extend(entries),
                Value::Undefined | Value::Null => {}
                other => {
                    warn!(kind = other.kind(), span = ?expr.span, "spread of a value that is not an object")
                }
            },
        }
    }
    map
}

/// References resolved relative to the site rather than another origin
fn is_local(target: &str) -> bool {
    const EXTERNAL: &[&str] = &["//", "#", "data:", "mailto:", "tel:", "javascript:"];
    !target.is_empty()
        && !target.contains("://")
        && !EXTERNAL.iter().any(|prefix| target.starts_with(prefix))
}

/// First path of `router` matching `url`, with its dynamic segments bound
pub(crate) fn route<'r>(router: &'r RouterDirective, url: &str) -> Option<(&'r PathDirective, Bindings)> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();

    router.paths.iter().find_map(|candidate| {
        let segments = &candidate.node.segments;
        if segments.len() != parts.len() {
            return None;
        }
        let mut params = Bindings::new();
        for (segment, part) in segments.iter().zip(&parts) {
            match &segment.node {
                PathSegment::Static(expected) if expected.as_str() == *part => {}
                PathSegment::Static(_) => return None,
                PathSegment::Dynamic(name) => {
                    params.insert(name.0.clone(), Value::from(*part));
                }
            }
        }
        Some((&candidate.node, params))
    })
}
