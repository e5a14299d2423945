use iris_core::error::AppError;
use iris_core::models::Record;
use iris_core::schema::{ExtractionSchema, FieldKind, FieldSpec};
use iris_core::traits::Extractor;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

/// CSS-selector extractor built on `scraper`.
///
/// Each element matched by the schema's base selector yields one record.
/// Fields that match nothing fall back to their default or are left out,
/// and elements that produce no fields at all (e.g. header rows) are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssExtractor;

impl CssExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for CssExtractor {
    fn extract(
        &self,
        document: &str,
        schema: &ExtractionSchema,
    ) -> Result<Vec<Record>, AppError> {
        let base = parse_selector(&schema.base_selector)?;
        let fields = compile(&schema.fields)?;

        let html = Html::parse_document(document);
        let records: Vec<Record> = html
            .select(&base)
            .map(|element| extract_item(element, &fields))
            .filter(|record| !record.is_empty())
            .collect();

        tracing::debug!(schema = %schema.name, count = records.len(), "Extracted records");
        Ok(records)
    }
}

/// A field with its selector parsed once per document.
struct CompiledField<'a> {
    spec: &'a FieldSpec,
    selector: Option<Selector>,
    children: Vec<CompiledField<'a>>,
}

fn parse_selector(raw: &str) -> Result<Selector, AppError> {
    Selector::parse(raw)
        .map_err(|e| AppError::ExtractionError(format!("Invalid selector '{raw}': {e}")))
}

fn compile(specs: &[FieldSpec]) -> Result<Vec<CompiledField<'_>>, AppError> {
    specs
        .iter()
        .map(|spec| {
            Ok(CompiledField {
                spec,
                selector: spec.selector.as_deref().map(parse_selector).transpose()?,
                children: compile(&spec.fields)?,
            })
        })
        .collect()
}

fn extract_item(element: ElementRef<'_>, fields: &[CompiledField<'_>]) -> Record {
    let mut record = Record::new();
    for field in fields {
        let value = extract_field(element, field)
            .or_else(|| field.spec.default.clone().map(Value::String));
        if let Some(value) = value {
            record.insert(field.spec.name.clone(), value);
        }
    }
    record
}

fn extract_field(element: ElementRef<'_>, field: &CompiledField<'_>) -> Option<Value> {
    match field.spec.kind {
        FieldKind::Text => first_match(element, field).map(|el| Value::String(text_of(el))),
        FieldKind::Attribute => {
            let name = field.spec.attribute.as_deref()?;
            first_match(element, field)?
                .value()
                .attr(name)
                .map(|v| Value::String(v.trim().to_string()))
        }
        FieldKind::Html => first_match(element, field).map(|el| Value::String(el.inner_html())),
        FieldKind::Nested => {
            first_match(element, field).map(|el| Value::Object(extract_item(el, &field.children)))
        }
        FieldKind::NestedList => {
            let items: Vec<Value> = all_matches(element, field)
                .into_iter()
                .map(|el| Value::Object(extract_item(el, &field.children)))
                .collect();
            Some(Value::Array(items))
        }
        FieldKind::List => {
            let first = field.children.first()?;
            let items: Vec<Value> = all_matches(element, field)
                .into_iter()
                .filter_map(|el| extract_field(el, first))
                .collect();
            Some(Value::Array(items))
        }
    }
}

fn first_match<'a>(element: ElementRef<'a>, field: &CompiledField<'_>) -> Option<ElementRef<'a>> {
    match &field.selector {
        Some(selector) => element.select(selector).next(),
        None => Some(element),
    }
}

fn all_matches<'a>(element: ElementRef<'a>, field: &CompiledField<'_>) -> Vec<ElementRef<'a>> {
    match &field.selector {
        Some(selector) => element.select(selector).collect(),
        None => vec![element],
    }
}

/// Trimmed, non-empty text fragments joined without separator.
fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
