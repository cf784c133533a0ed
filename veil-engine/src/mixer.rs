use crate::permutations::{permute_locations, permute_methods, permute_paths, permute_result};
use crate::processor::{RequestProcessor, ResultProcessor};
use crate::request::UpstreamRequest;
use serde_json::Value;
use veil_core::swagger::operation_parameters;
use veil_core::user::{UpstreamUser, UserRecord};
use veil_core::{Parameter, ProxyError, SwaggerDoc, SynonymTable};

/// Per-user metadata bundled into a mixer at construction: the local user
/// record and the matching upstream `/users` record.
#[derive(Debug, Clone)]
pub struct MixerMeta {
    pub user: UserRecord,
    pub user_data: UpstreamUser,
}

/// Build-time knobs for the permutation pipeline.
#[derive(Debug, Clone)]
pub struct MixerOptions {
    /// Re-label HTTP methods (off by default, see `EngineConfig`).
    pub permute_methods: bool,

    pub synonyms: SynonymTable,
}

impl Default for MixerOptions {
    fn default() -> Self {
        Self {
            permute_methods: false,
            synonyms: SynonymTable::builtin(),
        }
    }
}

/// The built artifact of applying the permutation pipeline for one seed:
/// both documents, the positional parameter bijection, per-user metadata,
/// and the processor chains. Immutable once built.
pub struct Mixer {
    canonical: SwaggerDoc,
    permuted: SwaggerDoc,
    canonical_params: Vec<Parameter>,
    permuted_params: Vec<Parameter>,
    seed: i64,
    pub meta: MixerMeta,
    request_processors: Vec<Box<dyn RequestProcessor>>,
    result_processors: Vec<Box<dyn ResultProcessor>>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("canonical", &self.canonical)
            .field("permuted", &self.permuted)
            .field("canonical_params", &self.canonical_params)
            .field("permuted_params", &self.permuted_params)
            .field("seed", &self.seed)
            .field("meta", &self.meta)
            .field(
                "request_processors",
                &self
                    .request_processors
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .field(
                "result_processors",
                &self
                    .result_processors
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Mixer {
    pub fn build(
        canonical: SwaggerDoc,
        seed: i64,
        meta: MixerMeta,
        options: &MixerOptions,
        request_processors: Vec<Box<dyn RequestProcessor>>,
        result_processors: Vec<Box<dyn ResultProcessor>>,
    ) -> Result<Self, ProxyError> {
        let mut permuted = canonical.clone();

        // Fixed pipeline order; each stage re-seeds its own generator.
        permute_paths(&mut permuted, seed, &options.synonyms)?;
        if options.permute_methods {
            permute_methods(&mut permuted, seed);
        }
        permute_locations(&mut permuted, seed);
        permute_result(&mut permuted);

        let canonical_params = as_parameters(&canonical);
        let permuted_params = as_parameters(&permuted);
        if canonical_params.len() != permuted_params.len() {
            return Err(ProxyError::Internal(format!(
                "parameter lists diverged: {} canonical vs {} permuted",
                canonical_params.len(),
                permuted_params.len()
            )));
        }

        Ok(Self {
            canonical,
            permuted,
            canonical_params,
            permuted_params,
            seed,
            meta,
            request_processors,
            result_processors,
        })
    }

    /// Resolve an observed permuted parameter back to `(permuted definition,
    /// canonical parameter)`. First matching index wins, in document order.
    /// The permuted definition is returned alongside because its compiled
    /// path template extracts placeholder values from the observed path.
    pub fn reverse(&self, observed: &Parameter) -> Result<(&Parameter, &Parameter), ProxyError> {
        self.permuted_params
            .iter()
            .zip(&self.canonical_params)
            .find(|(permuted, _)| permuted.matches(observed))
            .ok_or_else(|| ProxyError::UnknownParameter(observed.to_string()))
    }

    pub fn canonical_swagger(&self) -> &SwaggerDoc {
        &self.canonical
    }

    pub fn permuted_swagger(&self) -> &SwaggerDoc {
        &self.permuted
    }

    pub fn canonical_params(&self) -> &[Parameter] {
        &self.canonical_params
    }

    pub fn permuted_params(&self) -> &[Parameter] {
        &self.permuted_params
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Run the request-processor chain over an assembled canonical request.
    pub fn process_request(&self, request: &mut UpstreamRequest) -> Result<(), ProxyError> {
        for processor in &self.request_processors {
            tracing::debug!(processor = %processor.name(), "Running request processor");
            processor.process(request, &self.meta)?;
        }
        Ok(())
    }

    /// Run the result-processor chain over a decoded upstream payload.
    pub fn process_result(&self, mut result: Value) -> Value {
        for processor in &self.result_processors {
            tracing::debug!(processor = %processor.name(), "Running result processor");
            result = processor.process(result, &self.meta);
        }
        result
    }
}

/// Walk a document in source order and record one `Parameter` per declared
/// parameter spec. An operation without parameters contributes the wildcard
/// dummy so its `(path, method)` still takes part in the bijection.
fn as_parameters(doc: &SwaggerDoc) -> Vec<Parameter> {
    let mut parameters = Vec::new();
    for (path, method, op) in doc.operations() {
        let before = parameters.len();
        for spec in operation_parameters(op) {
            let location = spec.get("in").and_then(Value::as_str);
            let name = spec.get("name").and_then(Value::as_str);
            if let (Some(location), Some(name)) = (location, name) {
                parameters.push(Parameter::from_spec(path, method, location, name));
            }
        }
        if parameters.len() == before {
            parameters.push(Parameter::wildcard(path, method));
        }
    }
    parameters
}
