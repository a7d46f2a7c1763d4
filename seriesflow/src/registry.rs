//! Stage kind registry.
//!
//! An open table keyed by discriminator tag. Each entry declares the kind's
//! field schema, whether it is a source or a chained kind, and a
//! constructor. Registration is additive: adding a kind never touches the
//! sorter or the assembler's replay loop.

use crate::errors::AssemblyError;
use crate::expr::Expression;
use crate::record::AttributeRecord;
use crate::stages::{
    BatchStage, DerivativeStage, GroupByStage, HttpOutStage, SampleStage, ShiftStage, Stage,
    StreamStage, WhereStage, WindowStage,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The expected runtime shape of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// A JSON string.
    String,
    /// An integral number; fractional values are rejected.
    Integer,
    /// Any number.
    Float,
    /// A JSON boolean.
    Boolean,
    /// An array of strings.
    StringList,
    /// A duration-literal string.
    Duration,
    /// A nested expression object.
    Expression,
}

/// One entry in a kind's field schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// The wire field name.
    pub name: String,
    /// The shape the field must hold.
    pub shape: FieldShape,
    /// Whether the field must be present.
    pub required: bool,
}

impl FieldSpec {
    /// Declares a required field.
    #[must_use]
    pub fn required(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
        }
    }

    /// Declares an optional field.
    #[must_use]
    pub fn optional(name: impl Into<String>, shape: FieldShape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
        }
    }
}

/// Whether a kind is an entry point or attaches to a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    /// Requires zero producers.
    Source,
    /// Requires exactly one producer.
    Chained,
}

type SourceBuildFn = Box<dyn Fn(&AttributeRecord) -> Result<Arc<dyn Stage>, AssemblyError> + Send + Sync>;
type ChainBuildFn = Box<
    dyn Fn(&Arc<dyn Stage>, &AttributeRecord) -> Result<Arc<dyn Stage>, AssemblyError>
        + Send
        + Sync,
>;

enum Builder {
    Source(SourceBuildFn),
    Chained(ChainBuildFn),
}

/// A registered stage kind: schema plus construction rule.
pub struct StageKindDef {
    type_of: String,
    schema: Vec<FieldSpec>,
    builder: Builder,
}

impl StageKindDef {
    /// Declares a source kind.
    #[must_use]
    pub fn source<F>(type_of: impl Into<String>, schema: Vec<FieldSpec>, build: F) -> Self
    where
        F: Fn(&AttributeRecord) -> Result<Arc<dyn Stage>, AssemblyError> + Send + Sync + 'static,
    {
        Self {
            type_of: type_of.into(),
            schema,
            builder: Builder::Source(Box::new(build)),
        }
    }

    /// Declares a chained kind. The constructor receives the already-built
    /// parent stage.
    #[must_use]
    pub fn chained<F>(type_of: impl Into<String>, schema: Vec<FieldSpec>, build: F) -> Self
    where
        F: Fn(&Arc<dyn Stage>, &AttributeRecord) -> Result<Arc<dyn Stage>, AssemblyError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            type_of: type_of.into(),
            schema,
            builder: Builder::Chained(Box::new(build)),
        }
    }

    /// The kind's discriminator tag.
    #[must_use]
    pub fn type_of(&self) -> &str {
        &self.type_of
    }

    /// The kind's role.
    #[must_use]
    pub fn role(&self) -> StageRole {
        match self.builder {
            Builder::Source(_) => StageRole::Source,
            Builder::Chained(_) => StageRole::Chained,
        }
    }

    /// The kind's field schema, in declaration order.
    #[must_use]
    pub fn schema(&self) -> &[FieldSpec] {
        &self.schema
    }

    /// Checks a record against the schema: required fields present, present
    /// fields of the declared shape.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::StageSchema`] naming the offending field.
    pub fn validate(&self, record: &AttributeRecord) -> Result<(), AssemblyError> {
        for spec in &self.schema {
            if !record.has(&spec.name) {
                if spec.required {
                    return Err(AssemblyError::schema(
                        &self.type_of,
                        &spec.name,
                        "missing required field",
                    ));
                }
                continue;
            }
            let checked = match spec.shape {
                FieldShape::String => record.string(&spec.name).map(|_| ()),
                FieldShape::Integer => record.integer(&spec.name).map(|_| ()),
                FieldShape::Float => record.float(&spec.name).map(|_| ()),
                FieldShape::Boolean => record.boolean(&spec.name).map(|_| ()),
                FieldShape::StringList => record.string_list(&spec.name).map(|_| ()),
                FieldShape::Duration => record.duration(&spec.name).map(|_| ()),
                FieldShape::Expression => record.expression(&spec.name).map(|_| ()),
            };
            checked.map_err(|err| {
                AssemblyError::schema(&self.type_of, &spec.name, err.to_string())
            })?;
        }
        Ok(())
    }

    /// Invokes the constructor with the validated record.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::StageSchema`] if construction is invoked
    /// with the wrong parent arity or the constructor rejects the record.
    pub fn construct(
        &self,
        parent: Option<&Arc<dyn Stage>>,
        record: &AttributeRecord,
    ) -> Result<Arc<dyn Stage>, AssemblyError> {
        match (&self.builder, parent) {
            (Builder::Source(build), None) => build(record),
            (Builder::Chained(build), Some(parent)) => build(parent, record),
            (Builder::Source(_), Some(_)) => Err(AssemblyError::schema(
                &self.type_of,
                "parent",
                "source kind constructed with a parent",
            )),
            (Builder::Chained(_), None) => Err(AssemblyError::schema(
                &self.type_of,
                "parent",
                "chained kind constructed without a parent",
            )),
        }
    }
}

impl fmt::Debug for StageKindDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageKindDef")
            .field("type_of", &self.type_of)
            .field("role", &self.role())
            .field("schema", &self.schema)
            .finish()
    }
}

/// The extensible tag-to-kind table.
#[derive(Debug, Default)]
pub struct StageRegistry {
    kinds: HashMap<String, StageKindDef>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry preloaded with the builtin kind catalog.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(stream_def());
        registry.register(batch_def());
        registry.register(window_def());
        registry.register(where_def());
        registry.register(sample_def());
        registry.register(derivative_def());
        registry.register(shift_def());
        registry.register(group_by_def());
        registry.register(http_out_def());
        registry
    }

    /// Registers a kind, replacing any previous entry for the same tag.
    pub fn register(&mut self, def: StageKindDef) {
        self.kinds.insert(def.type_of.clone(), def);
    }

    /// Resolves a discriminator tag.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::UnknownStageType`] for unregistered tags.
    pub fn get(&self, type_of: &str) -> Result<&StageKindDef, AssemblyError> {
        self.kinds
            .get(type_of)
            .ok_or_else(|| AssemblyError::UnknownStageType {
                type_of: type_of.to_string(),
            })
    }

    /// Returns true if the tag is registered.
    #[must_use]
    pub fn contains(&self, type_of: &str) -> bool {
        self.kinds.contains_key(type_of)
    }

    /// Lists registered tags in sorted order.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

static DEFAULT_REGISTRY: RwLock<Option<Arc<StageRegistry>>> = RwLock::new(None);

/// Returns the process-wide registry of builtin kinds, constructing it on
/// first use.
pub fn default_registry() -> Arc<StageRegistry> {
    {
        let read = DEFAULT_REGISTRY.read();
        if let Some(registry) = read.as_ref() {
            return Arc::clone(registry);
        }
    }

    let mut write = DEFAULT_REGISTRY.write();
    let registry = write.get_or_insert_with(|| Arc::new(StageRegistry::with_defaults()));
    Arc::clone(registry)
}

fn boolean_or(
    record: &AttributeRecord,
    field: &str,
    default: bool,
) -> Result<bool, AssemblyError> {
    if record.has(field) {
        record.boolean(field)
    } else {
        Ok(default)
    }
}

fn duration_or(
    record: &AttributeRecord,
    field: &str,
    default: Duration,
) -> Result<Duration, AssemblyError> {
    if record.has(field) {
        record.duration(field)
    } else {
        Ok(default)
    }
}

fn required_expression(
    record: &AttributeRecord,
    type_of: &str,
    field: &str,
) -> Result<Expression, AssemblyError> {
    record
        .expression(field)?
        .ok_or_else(|| AssemblyError::schema(type_of, field, "missing required field"))
}

fn stream_def() -> StageKindDef {
    StageKindDef::source("stream", Vec::new(), |_record| Ok(Arc::new(StreamStage)))
}

fn batch_def() -> StageKindDef {
    StageKindDef::source("batch", Vec::new(), |_record| Ok(Arc::new(BatchStage)))
}

fn window_def() -> StageKindDef {
    StageKindDef::chained(
        "window",
        vec![
            FieldSpec::required("period", FieldShape::Duration),
            FieldSpec::optional("every", FieldShape::Duration),
            FieldSpec::optional("align", FieldShape::Boolean),
            FieldSpec::optional("fillPeriod", FieldShape::Boolean),
        ],
        |_parent, record| {
            let period = record.duration("period")?;
            Ok(Arc::new(WindowStage {
                period,
                every: duration_or(record, "every", period)?,
                align: boolean_or(record, "align", false)?,
                fill_period: boolean_or(record, "fillPeriod", false)?,
            }))
        },
    )
}

fn where_def() -> StageKindDef {
    StageKindDef::chained(
        "where",
        vec![FieldSpec::required("lambda", FieldShape::Expression)],
        |_parent, record| {
            Ok(Arc::new(WhereStage {
                predicate: required_expression(record, "where", "lambda")?,
            }))
        },
    )
}

fn sample_def() -> StageKindDef {
    StageKindDef::chained(
        "sample",
        vec![FieldSpec::required("count", FieldShape::Integer)],
        |_parent, record| {
            let count = record.integer("count")?;
            if count < 1 {
                return Err(AssemblyError::schema(
                    "sample",
                    "count",
                    "must be at least 1",
                ));
            }
            Ok(Arc::new(SampleStage { count }))
        },
    )
}

fn derivative_def() -> StageKindDef {
    StageKindDef::chained(
        "derivative",
        vec![
            FieldSpec::required("field", FieldShape::String),
            FieldSpec::optional("unit", FieldShape::Duration),
            FieldSpec::optional("nonNegative", FieldShape::Boolean),
        ],
        |_parent, record| {
            Ok(Arc::new(DerivativeStage {
                field: record.string("field")?.to_string(),
                unit: duration_or(record, "unit", Duration::from_secs(1))?,
                non_negative: boolean_or(record, "nonNegative", false)?,
            }))
        },
    )
}

fn shift_def() -> StageKindDef {
    StageKindDef::chained(
        "shift",
        vec![FieldSpec::required("shift", FieldShape::Duration)],
        |_parent, record| {
            Ok(Arc::new(ShiftStage {
                offset: record.duration("shift")?,
            }))
        },
    )
}

fn group_by_def() -> StageKindDef {
    StageKindDef::chained(
        "groupBy",
        vec![FieldSpec::required("dimensions", FieldShape::StringList)],
        |_parent, record| {
            Ok(Arc::new(GroupByStage {
                dimensions: record.string_list("dimensions")?,
            }))
        },
    )
}

fn http_out_def() -> StageKindDef {
    StageKindDef::chained(
        "httpOut",
        vec![FieldSpec::required("endpoint", FieldShape::String)],
        |_parent, record| {
            Ok(Arc::new(HttpOutStage {
                endpoint: record.string("endpoint")?.to_string(),
            }))
        },
    )
}
