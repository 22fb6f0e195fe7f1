//! C# entity front-end
//!
//! Walks a .NET source tree and extracts data entities:
//! - Property-only classes and records become entities
//! - Property types map to semantic types
//! - `[Key]`, `[Required]`, `[StringLength(n)]`, `[MaxLength(n)]` become constraints
//! - Navigation properties and `<Entity>Id` foreign keys become relationships

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tree_sitter::{Node, Parser};
use walkdir::WalkDir;

use super::EntityExtractor;
use crate::error::{DecompositionError, DecompositionResult};
use crate::model::{
    Attribute, Constraint, Entity, EntityId, ExtractedModel, Relationship, RelationshipKind,
    SemanticType,
};

const SKIPPED_DIRS: &[&str] = &["bin", "obj", ".git", ".vs", "node_modules", "packages"];

/// Classes with these suffixes are infrastructure, not data.
const NON_ENTITY_SUFFIXES: &[&str] = &[
    "Controller",
    "Service",
    "Repository",
    "Context",
    "Dto",
    "ViewModel",
    "Options",
    "Settings",
];

const COLLECTIONS: &[&str] = &[
    "ICollection",
    "IList",
    "IEnumerable",
    "List",
    "HashSet",
    "Collection",
    "ISet",
    "IReadOnlyCollection",
];

// ============================================================================
// Raw syntax
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct RawAttribute {
    name: String,
    arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct RawProperty {
    name: String,
    /// Type text without a trailing `?`
    type_text: String,
    nullable: bool,
    attributes: Vec<RawAttribute>,
}

impl RawProperty {
    fn has_attribute(&self, name: &str) -> bool {
        self.attributes
            .iter()
            .any(|a| a.name == name || a.name == format!("{}Attribute", name))
    }

    fn length_limit(&self) -> Option<u32> {
        self.attributes
            .iter()
            .filter(|a| matches!(a.name.as_str(), "StringLength" | "MaxLength"))
            .find_map(|a| {
                let args = a.arguments.as_deref()?;
                let digits: String = args
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits.parse().ok()
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RawClass {
    name: String,
    path: String,
    properties: Vec<RawProperty>,
    has_methods: bool,
}

impl RawClass {
    fn is_entity(&self) -> bool {
        !self.has_methods
            && !self.properties.is_empty()
            && !NON_ENTITY_SUFFIXES.iter().any(|s| self.name.ends_with(s))
    }
}

fn text<'a>(node: &Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

fn field_text<'a>(node: &Node, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text(&n, source))
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error)
}

fn attributes_of(node: &Node, source: &str) -> Vec<RawAttribute> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    for list in node.children(&mut cursor).filter(|c| c.kind() == "attribute_list") {
        let mut inner = list.walk();
        for attr in list.children(&mut inner).filter(|c| c.kind() == "attribute") {
            let Some(name) = field_text(&attr, "name", source) else {
                continue;
            };
            let mut args_cursor = attr.walk();
            let arguments = attr
                .children(&mut args_cursor)
                .find(|c| c.kind() == "attribute_argument_list")
                .map(|a| text(&a, source).to_string());
            out.push(RawAttribute {
                name: name.rsplit('.').next().unwrap_or(name).to_string(),
                arguments,
            });
        }
    }
    out
}

fn modifiers_of<'a>(node: &Node, source: &'a str) -> Vec<&'a str> {
    let mut cursor = node.walk();
    node.children(&mut cursor)
        .filter(|c| c.kind() == "modifier")
        .map(|c| text(&c, source))
        .collect()
}

fn extract_property(node: &Node, source: &str) -> Option<RawProperty> {
    let modifiers = modifiers_of(node, source);
    if !modifiers.contains(&"public") || modifiers.contains(&"static") {
        return None;
    }
    // Expression-bodied properties are computed, not stored
    if node.child_by_field_name("accessors").is_none() {
        return None;
    }
    let name = field_text(node, "name", source)?.to_string();
    let raw_type = field_text(node, "type", source)?.trim();
    let (type_text, nullable) = match raw_type.strip_suffix('?') {
        Some(inner) => (inner.to_string(), true),
        None => (raw_type.to_string(), false),
    };
    Some(RawProperty {
        name,
        type_text,
        nullable,
        attributes: attributes_of(node, source),
    })
}

fn extract_class(node: &Node, source: &str, path: &str) -> Option<RawClass> {
    let name = field_text(node, "name", source)?.to_string();
    let body = node.child_by_field_name("body")?;
    let mut class = RawClass {
        name,
        path: path.to_string(),
        properties: Vec::new(),
        has_methods: false,
    };
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        match member.kind() {
            "property_declaration" => {
                if let Some(p) = extract_property(&member, source) {
                    class.properties.push(p);
                }
            }
            "method_declaration" | "operator_declaration" => class.has_methods = true,
            _ => {}
        }
    }
    Some(class)
}

fn collect_classes(node: &Node, source: &str, path: &str, out: &mut Vec<RawClass>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "class_declaration" | "record_declaration" => {
                if let Some(class) = extract_class(&child, source, path) {
                    out.push(class);
                }
                if let Some(body) = child.child_by_field_name("body") {
                    collect_classes(&body, source, path, out);
                }
            }
            _ => collect_classes(&child, source, path, out),
        }
    }
}

/// Parse one C# file into its classes.
fn parse_file(path: &str, source: &str) -> DecompositionResult<Vec<RawClass>> {
    let unparsable = |reason: String| DecompositionError::UnparsableSource {
        path: path.to_string(),
        reason,
    };
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_c_sharp::LANGUAGE.into())
        .map_err(|e| DecompositionError::Internal(format!("C# grammar: {}", e)))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| unparsable("parser produced no tree".into()))?;

    let root = tree.root_node();
    if root.has_error() {
        let row = first_error(root).unwrap_or(root).start_position().row + 1;
        return Err(unparsable(format!("syntax error at line {}", row)));
    }

    let mut classes = Vec::new();
    collect_classes(&root, source, path, &mut classes);
    Ok(classes)
}

// ============================================================================
// Type mapping
// ============================================================================

enum PropertyShape<'a> {
    Scalar(SemanticType),
    Reference(&'a str),
    Collection(&'a str),
}

fn unqualified(type_text: &str) -> &str {
    type_text.rsplit('.').next().unwrap_or(type_text).trim()
}

fn semantic_type(type_text: &str) -> SemanticType {
    match unqualified(type_text) {
        "int" | "Int32" | "short" | "Int16" | "byte" | "Byte" | "sbyte" | "ushort" => {
            SemanticType::Integer
        }
        "long" | "Int64" | "uint" | "ulong" => SemanticType::BigInteger,
        "decimal" | "Decimal" => SemanticType::Decimal,
        "double" | "Double" | "float" | "Single" => SemanticType::Float,
        "bool" | "Boolean" => SemanticType::Boolean,
        "string" | "String" | "char" | "Char" => SemanticType::Text,
        "DateTime" | "DateTimeOffset" => SemanticType::DateTime,
        "DateOnly" => SemanticType::Date,
        "Guid" => SemanticType::Uuid,
        "byte[]" | "Byte[]" => SemanticType::Binary,
        other => SemanticType::Other(other.to_string()),
    }
}

fn is_value_type(semantic: &SemanticType) -> bool {
    !matches!(
        semantic,
        SemanticType::Text | SemanticType::Binary | SemanticType::Other(_)
    )
}

fn shape<'a>(property: &'a RawProperty, entities: &BTreeSet<&str>) -> PropertyShape<'a> {
    let type_text = property.type_text.as_str();
    if let Some((outer, rest)) = type_text.split_once('<') {
        let inner = unqualified(rest.trim_end_matches('>'));
        if COLLECTIONS.contains(&unqualified(outer)) && entities.contains(inner) {
            return PropertyShape::Collection(inner);
        }
    }
    if let Some(element) = type_text.strip_suffix("[]") {
        if entities.contains(unqualified(element)) {
            return PropertyShape::Collection(unqualified(element));
        }
    }
    let bare = unqualified(type_text);
    if entities.contains(bare) {
        return PropertyShape::Reference(bare);
    }
    PropertyShape::Scalar(semantic_type(type_text))
}

// ============================================================================
// Model assembly
// ============================================================================

#[derive(Default)]
struct Link {
    required: bool,
    kind: Option<RelationshipKind>,
}

/// Turn parsed classes into a normalized model. Entity ids are assigned
/// 1..n in class-name order.
fn assemble(classes: Vec<RawClass>) -> ExtractedModel {
    let mut by_name: BTreeMap<String, RawClass> = BTreeMap::new();
    for class in classes.into_iter().filter(RawClass::is_entity) {
        if let Some(existing) = by_name.get(&class.name) {
            warn!(
                class = %class.name,
                kept = %existing.path,
                skipped = %class.path,
                "Duplicate entity class skipped"
            );
            continue;
        }
        by_name.insert(class.name.clone(), class);
    }

    let ids: BTreeMap<&str, EntityId> = by_name
        .keys()
        .enumerate()
        .map(|(i, name)| (name.as_str(), EntityId(i as u64 + 1)))
        .collect();
    let names: BTreeSet<&str> = ids.keys().copied().collect();

    // Which entity holds a single reference to which
    let mut references: BTreeSet<(&str, &str)> = BTreeSet::new();
    for class in by_name.values() {
        for p in &class.properties {
            if let PropertyShape::Reference(target) = shape(p, &names) {
                references.insert((class.name.as_str(), target));
            }
        }
    }

    let mut links: BTreeMap<(EntityId, EntityId), Link> = BTreeMap::new();
    let mut entities = Vec::with_capacity(by_name.len());

    for class in by_name.values() {
        let id = ids[class.name.as_str()];
        let mut entity = Entity::new(id, class.name.clone());
        entity.source_path = Some(class.path.clone());

        for p in &class.properties {
            match shape(p, &names) {
                PropertyShape::Reference(target) => {
                    let link = links.entry((id, ids[target])).or_default();
                    link.kind = Some(RelationshipKind::OneToMany);
                    link.required |= p.has_attribute("Required");
                }
                PropertyShape::Collection(target) => {
                    // The inverse side is already encoded by the target's reference.
                    if references.contains(&(target, class.name.as_str())) {
                        continue;
                    }
                    let target_id = ids[target];
                    let target_has_collection = by_name[target].properties.iter().any(|tp| {
                        matches!(shape(tp, &names), PropertyShape::Collection(t) if t == class.name)
                    });
                    if target_has_collection {
                        // Many-to-many: encoded once, from the lower id
                        if id < target_id {
                            links.entry((id, target_id)).or_default().kind =
                                Some(RelationshipKind::ManyToMany);
                        }
                    } else {
                        links.entry((target_id, id)).or_default().kind =
                            Some(RelationshipKind::OneToMany);
                    }
                }
                PropertyShape::Scalar(semantic) => {
                    let mut attribute = Attribute::new(p.name.clone(), semantic.clone());
                    let conventional_key = p.name == "Id" || p.name == format!("{}Id", class.name);
                    if p.has_attribute("Key") || conventional_key {
                        attribute = attribute.with(Constraint::PrimaryKey);
                    }
                    let required =
                        p.has_attribute("Required") || (!p.nullable && is_value_type(&semantic));
                    if required {
                        attribute = attribute.with(Constraint::Required);
                    }
                    if let Some(n) = p.length_limit() {
                        attribute = attribute.with(Constraint::MaxLength(n));
                    }

                    // Foreign key by convention: `<Entity>Id`
                    if let Some(target) = p.name.strip_suffix("Id").filter(|t| names.contains(t)) {
                        if target != class.name {
                            let link = links.entry((id, ids[target])).or_default();
                            link.required |= required;
                            link.kind = link.kind.or(Some(RelationshipKind::OneToMany));
                        }
                    }
                    entity = entity.with_attribute(attribute);
                }
            }
        }
        entities.push(entity);
    }

    let relationships = links
        .into_iter()
        .filter(|((from, to), _)| from != to)
        .map(|((from, to), link)| {
            Relationship::new(
                from,
                to,
                link.kind.unwrap_or(RelationshipKind::OneToMany),
                link.required,
            )
        })
        .collect();
    ExtractedModel::new(entities, relationships)
}

// ============================================================================
// Extractor
// ============================================================================

/// Tree-sitter based extractor for C# source trees.
#[derive(Debug, Clone)]
pub struct CSharpEntityExtractor {
    workers: usize,
}

impl CSharpEntityExtractor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    fn source_files(root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                e.depth() == 0 || !e.file_type().is_dir() || !SKIPPED_DIRS.contains(&&*name)
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("cs"))
            .collect();
        files.sort();
        files
    }
}

impl Default for CSharpEntityExtractor {
    fn default() -> Self {
        Self::new(4)
    }
}

impl EntityExtractor for CSharpEntityExtractor {
    fn name(&self) -> &'static str {
        "csharp"
    }

    fn extract(&self, source: &Path) -> DecompositionResult<ExtractedModel> {
        if !source.is_dir() {
            return Err(DecompositionError::UnparsableSource {
                path: source.display().to_string(),
                reason: "not a directory".into(),
            });
        }
        let files = Self::source_files(source);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| DecompositionError::Internal(format!("extraction pool: {}", e)))?;

        let per_file: Vec<Vec<RawClass>> = pool.install(|| {
            files
                .par_iter()
                .map(|path| -> DecompositionResult<Vec<RawClass>> {
                    let relative = path
                        .strip_prefix(source)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    let content =
                        std::fs::read_to_string(path).map_err(|e| DecompositionError::io(path, e))?;
                    let classes = parse_file(&relative, &content)?;
                    debug!(file = %relative, classes = classes.len(), "Parsed C# file");
                    Ok(classes)
                })
                .collect::<DecompositionResult<Vec<_>>>()
        })?;

        let model = assemble(per_file.into_iter().flatten().collect());
        info!(
            root = %source.display(),
            files = files.len(),
            entities = model.entities.len(),
            relationships = model.relationships.len(),
            "C# entities extracted"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODELS: &str = r#"
using System.ComponentModel.DataAnnotations;

namespace Shop.Models
{
    public class User
    {
        [Key]
        public int Id { get; set; }

        [Required]
        [StringLength(100)]
        public string Name { get; set; }

        public ICollection<Order> Orders { get; set; }
    }

    public class Order
    {
        public int Id { get; set; }
        public int UserId { get; set; }
        public User User { get; set; }
        public int ProductId { get; set; }
        public Product Product { get; set; }
        public DateTime PlacedAt { get; set; }
        public decimal? Discount { get; set; }
        public decimal Total => 0;
    }
}
"#;

    const PRODUCT: &str = r#"
namespace Shop.Models;

public class Product
{
    public int Id { get; set; }
    [MaxLength(200)]
    public string? Title { get; set; }
    public Guid Sku { get; set; }
}
"#;

    const CONTROLLER: &str = r#"
public class OrdersController : Controller
{
    public string Title { get; set; }
    public IActionResult Index()
    {
        return View();
    }
}
"#;

    fn write_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Models")).unwrap();
        std::fs::create_dir_all(dir.path().join("Controllers")).unwrap();
        std::fs::create_dir_all(dir.path().join("obj")).unwrap();
        std::fs::write(dir.path().join("Models/Shop.cs"), MODELS).unwrap();
        std::fs::write(dir.path().join("Models/Product.cs"), PRODUCT).unwrap();
        std::fs::write(dir.path().join("Controllers/OrdersController.cs"), CONTROLLER).unwrap();
        std::fs::write(dir.path().join("obj/Generated.cs"), "this is { not C#").unwrap();
        dir
    }

    #[test]
    fn test_extracts_entities_in_name_order() {
        let dir = write_tree();
        let model = CSharpEntityExtractor::new(2).extract(dir.path()).unwrap();

        let names: Vec<&str> = model.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Order", "Product", "User"]);

        let order = model.entity(EntityId(1)).unwrap();
        assert_eq!(order.source_path.as_deref(), Some("Models/Shop.cs"));
        assert!(order.attribute("Id").unwrap().is_primary_key());
        assert!(order.attribute("User").is_none());
        assert!(order.attribute("Total").is_none());
        assert_eq!(order.attribute("PlacedAt").unwrap().semantic_type, SemanticType::DateTime);
        assert!(!order.attribute("Discount").unwrap().is_required());

        let product = model.entity(EntityId(2)).unwrap();
        assert_eq!(product.attribute("Title").unwrap().max_length(), Some(200));
        assert!(!product.attribute("Title").unwrap().is_required());
        assert_eq!(product.attribute("Sku").unwrap().semantic_type, SemanticType::Uuid);

        let user = model.entity(EntityId(3)).unwrap();
        let name = user.attribute("Name").unwrap();
        assert!(name.is_required());
        assert_eq!(name.max_length(), Some(100));
    }

    #[test]
    fn test_relationships_from_navigation_and_foreign_keys() {
        let dir = write_tree();
        let model = CSharpEntityExtractor::default().extract(dir.path()).unwrap();

        // Order → Product, Order → User; User.Orders is the inverse and adds nothing.
        assert_eq!(
            model.relationships,
            vec![
                Relationship::new(EntityId(1), EntityId(2), RelationshipKind::OneToMany, true),
                Relationship::new(EntityId(1), EntityId(3), RelationshipKind::OneToMany, true),
            ]
        );
    }

    #[test]
    fn test_many_to_many_encoded_once() {
        let source = r#"
public class Student { public int Id { get; set; } public List<Course> Courses { get; set; } }
public class Course { public int Id { get; set; } public List<Student> Students { get; set; } }
"#;
        let classes = parse_file("School.cs", source).unwrap();
        let model = assemble(classes);
        assert_eq!(model.relationships.len(), 1);
        assert_eq!(model.relationships[0].kind, RelationshipKind::ManyToMany);
        assert!(!model.relationships[0].required);
    }

    #[test]
    fn test_syntax_error_is_unparsable() {
        let err = parse_file("Broken.cs", "public class { int").unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::UnparsableSource { ref path, .. } if path == "Broken.cs"
        ));
    }

    #[test]
    fn test_not_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(CSharpEntityExtractor::default().extract(file.path()).is_err());
    }
}
