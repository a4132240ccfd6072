use std::collections::HashMap;

use log::debug;

use crate::ast::{Ast, NodeId, NodeKind};

/// Per-session template instantiation cache, keyed by the template
/// definition and the canonical parameter tuple. Two requests with
/// equal parameter tuples yield the same instantiation node.
#[derive(Debug, Default)]
pub struct TemplateCache {
    instances: HashMap<String, NodeId>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instantiate `template_node` (a [NodeKind::Template]) with the
    /// given argument nodes. `canonical_args` is the canonical
    /// rendering of the argument tuple used as the cache key.
    pub fn instantiate(
        &mut self,
        ast: &mut Ast,
        template_node: NodeId,
        canonical_args: &[String],
        arg_nodes: &[NodeId],
    ) -> Result<NodeId, String> {
        let NodeKind::Template { params, body } = ast.kind(template_node) else {
            return Err("not a template".to_owned());
        };
        let (params, body) = (params.clone(), *body);
        if params.len() != arg_nodes.len() {
            return Err(format!(
                "template expects {} parameter(s), got {}",
                params.len(),
                arg_nodes.len()
            ));
        }

        let key = format!("{}[{}]", template_node.0, canonical_args.join(","));
        if let Some(existing) = self.instances.get(&key) {
            return Ok(*existing);
        }

        let mut substitutions = HashMap::new();
        for (param, arg) in params.iter().zip(arg_nodes.iter()) {
            substitutions.insert(param.clone(), *arg);
        }
        let instance = ast.deep_clone(body, &substitutions);
        // The instance resolves names from the template's defining
        // scope, without being a statement of it.
        ast.set_parent(instance, ast.parent(template_node));
        self.instances.insert(key.clone(), instance);
        debug!("instantiated template as `{key}`");
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Ast, NodeKind};
    use crate::basic::SourceLocation;

    use super::TemplateCache;

    #[test]
    fn test_instantiation_is_cached_per_tuple() {
        let mut ast = Ast::new();
        let loc = SourceLocation::default();
        let param_ref = ast.add(
            NodeKind::Identifier {
                name: "T".to_owned(),
            },
            loc,
        );
        let body = ast.add(
            NodeKind::PointerType { content: param_ref },
            loc,
        );
        let template = ast.add(
            NodeKind::Template {
                params: vec!["T".to_owned()],
                body,
            },
            loc,
        );

        let int_arg = ast.add(
            NodeKind::Identifier {
                name: "Int".to_owned(),
            },
            loc,
        );
        let float_arg = ast.add(
            NodeKind::Identifier {
                name: "Float".to_owned(),
            },
            loc,
        );

        let mut cache = TemplateCache::new();
        let first = cache
            .instantiate(&mut ast, template, &["Int".to_owned()], &[int_arg])
            .unwrap();
        let second = cache
            .instantiate(&mut ast, template, &["Int".to_owned()], &[int_arg])
            .unwrap();
        let other = cache
            .instantiate(&mut ast, template, &["Float".to_owned()], &[float_arg])
            .unwrap();

        // Equal tuples are node-identical; distinct tuples are not.
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(cache.len(), 2);

        // The parameter was substituted in the clone.
        let NodeKind::PointerType { content } = ast.kind(first) else {
            panic!("expected pointer type body");
        };
        assert!(matches!(
            ast.kind(*content),
            NodeKind::Identifier { name } if name == "Int"
        ));
    }

    #[test]
    fn test_arity_mismatch_fails() {
        let mut ast = Ast::new();
        let loc = SourceLocation::default();
        let body = ast.add(NodeKind::VoidType, loc);
        let template = ast.add(
            NodeKind::Template {
                params: vec!["T".to_owned()],
                body,
            },
            loc,
        );
        let mut cache = TemplateCache::new();
        assert!(cache
            .instantiate(&mut ast, template, &[], &[])
            .is_err());
    }
}
