//! Model spec expansion — `[[models]]` entries into labeled task templates.
//!
//! Fixed-param entries pass through as one template. Grid entries enumerate
//! the cartesian product of their value lists with keys in sorted order (the
//! product order defines which combos survive a `max_trials` cut), then keep
//! either the first `max_trials` combos (`grid`) or a seeded random sample
//! drawn without replacement (`random`).

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use windrace_core::{category_for, format_param_value, ModelCategory, ParamValue, Params};

use crate::config::{ModelConfig, SearchMethod};

/// Default number of random trials when `max_trials` is not set.
pub const DEFAULT_RANDOM_TRIALS: usize = 10;

/// A concrete model variant, ready to be paired with sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub model_name: String,
    pub params: Params,
    pub label: String,
    pub category: ModelCategory,
}

impl TaskTemplate {
    pub fn new(model_name: impl Into<String>, params: Params) -> Self {
        let model_name = model_name.into();
        Self {
            label: format_model_label(&model_name, &params),
            category: category_for(&model_name),
            model_name,
            params,
        }
    }
}

/// `name` when `params` is empty, otherwise `name[k1=v1,k2=v2]` with keys sorted.
pub fn format_model_label(name: &str, params: &Params) -> String {
    if params.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", format_param_value(v)))
        .collect();
    format!("{name}[{}]", rendered.join(","))
}

/// Expand every model config into templates, in config order.
///
/// The RNG is seeded once per call, so the random draws for later configs
/// depend on the draws for earlier ones.
pub fn expand(model_configs: &[ModelConfig], seed: u64) -> Vec<TaskTemplate> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut expanded = Vec::new();

    for cfg in model_configs {
        let Some(grid) = cfg.active_grid() else {
            expanded.push(TaskTemplate::new(&cfg.name, cfg.params.clone()));
            continue;
        };

        let keys: Vec<&String> = grid.keys().collect();
        let values: Vec<&Vec<ParamValue>> = grid.values().collect();
        let combos = cartesian_product(&values);

        let chosen: Vec<usize> = match cfg.search.method {
            SearchMethod::Random => {
                let wanted = cfg
                    .search
                    .trial_cap()
                    .unwrap_or_else(|| DEFAULT_RANDOM_TRIALS.min(combos.len()));
                let n = wanted.min(combos.len());
                rand::seq::index::sample(&mut rng, combos.len(), n).into_vec()
            }
            SearchMethod::Grid => {
                let n = cfg.search.trial_cap().unwrap_or(combos.len()).min(combos.len());
                (0..n).collect()
            }
        };

        for idx in chosen {
            let params: Params = keys
                .iter()
                .zip(&combos[idx])
                .map(|(k, v)| ((*k).clone(), (*v).clone()))
                .collect();
            expanded.push(TaskTemplate::new(&cfg.name, params));
        }
    }

    expanded
}

/// All combinations of one value per list, last list varying fastest.
fn cartesian_product<'a>(lists: &[&'a Vec<ParamValue>]) -> Vec<Vec<&'a ParamValue>> {
    let mut combos: Vec<Vec<&ParamValue>> = vec![Vec::with_capacity(lists.len())];
    for list in lists {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for prefix in &combos {
            for value in list.iter() {
                let mut combo = prefix.clone();
                combo.push(value);
                next.push(combo);
            }
        }
        combos = next;
    }
    combos
}
