//! Reconciliation engine for metronome-sync
//!
//! The engine orchestrates:
//! 1. Assembly - declared resources from the manifest, enriched from state
//! 2. Planning - observe only, report what a pass would change
//! 3. Executing - dependency tiers forward, then deletions in reverse

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ApplyOptions, ClientFactory, Engine, Http, Report};

use anyhow::{Result, bail};
use reconcile::{Declared, Outcome};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

use crate::kinds::{
    BillableMetricResource, CustomFieldKeyResource, Kind, Parameters, ProductResource,
    RateCardResource, RateResource,
};
use crate::manifest::{Entry, Manifest};
use crate::state::State;

/// Every declared resource of one pass, grouped by kind
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub billable_metrics: Vec<BillableMetricResource>,
    pub custom_field_keys: Vec<CustomFieldKeyResource>,
    pub products: Vec<ProductResource>,
    pub rate_cards: Vec<RateCardResource>,
    pub rates: Vec<RateResource>,
}

impl Inventory {
    /// Declare the manifest's resources, restoring what earlier passes learned.
    ///
    /// Entries tracked in state but gone from the manifest come back marked
    /// for deletion.
    pub fn assemble(manifest: &Manifest, state: &State) -> Self {
        Self {
            billable_metrics: declare(Kind::BillableMetric, &manifest.billable_metric, state),
            custom_field_keys: declare(Kind::CustomFieldKey, &manifest.custom_field_key, state),
            products: declare(Kind::Product, &manifest.product, state),
            rate_cards: declare(Kind::RateCard, &manifest.rate_card, state),
            rates: declare(Kind::Rate, &manifest.rate, state),
        }
    }

    pub fn len(&self) -> usize {
        self.billable_metrics.len()
            + self.custom_field_keys.len()
            + self.products.len()
            + self.rate_cards.len()
            + self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of resources marked for deletion that `target` selects
    pub fn deleting(&self, target: &Target) -> Vec<String> {
        let mut keys = Vec::new();
        collect_deleting(&self.billable_metrics, Kind::BillableMetric, target, &mut keys);
        collect_deleting(&self.custom_field_keys, Kind::CustomFieldKey, target, &mut keys);
        collect_deleting(&self.products, Kind::Product, target, &mut keys);
        collect_deleting(&self.rate_cards, Kind::RateCard, target, &mut keys);
        collect_deleting(&self.rates, Kind::Rate, target, &mut keys);
        keys
    }

    /// Write a pass back to state.
    ///
    /// Resources the pass touched are recorded; deleted ones are forgotten.
    pub fn write_back(&self, report: &Report, state: &mut State) -> Result<()> {
        let touched: BTreeSet<&str> = report.outcomes.iter().map(|(k, _)| k.as_str()).collect();
        record(&self.billable_metrics, &touched, state)?;
        record(&self.custom_field_keys, &touched, state)?;
        record(&self.products, &touched, state)?;
        record(&self.rate_cards, &touched, state)?;
        record(&self.rates, &touched, state)?;

        for (key, outcome) in &report.outcomes {
            if *outcome == Outcome::Deleted {
                log::debug!("{key}: finalized");
                state.remove(key);
            }
        }
        Ok(())
    }
}

fn declare<P, O>(kind: Kind, entries: &[Entry<P>], state: &State) -> Vec<Declared<P, O>>
where
    P: Parameters,
    O: DeserializeOwned,
{
    let mut resources: Vec<Declared<P, O>> = entries
        .iter()
        .map(|entry| {
            let mut declared = Declared::new(kind.name(), &entry.name, entry.parameters.clone())
                .with_provider_config(&entry.provider_config)
                .with_labels(entry.labels.clone());

            if let Some(previous) = state.get(&declared.key()) {
                if let Some(params) = previous.parameters::<P>() {
                    declared.parameters_mut().carry_over(&params);
                }
                previous.restore_into(&mut declared);
            }
            declared
        })
        .collect();

    let declared_names: BTreeSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    for previous in state.of_kind(kind.name()) {
        if declared_names.contains(previous.name.as_str()) {
            continue;
        }
        match previous.orphan::<P, O>() {
            Some(orphan) => {
                log::debug!("{kind}/{}: removed from manifest, deleting", previous.name);
                resources.push(orphan);
            }
            None => log::warn!(
                "{kind}/{}: removed from manifest but its state cannot be read; not deleting",
                previous.name
            ),
        }
    }

    resources.sort_by(|a, b| a.name().cmp(b.name()));
    resources
}

fn collect_deleting<P, O>(
    resources: &[Declared<P, O>],
    kind: Kind,
    target: &Target,
    keys: &mut Vec<String>,
) {
    keys.extend(
        resources
            .iter()
            .filter(|r| r.is_deleting() && target.matches(kind, r.name()))
            .map(Declared::key),
    );
}

fn record<P: Serialize, O: Serialize>(
    resources: &[Declared<P, O>],
    touched: &BTreeSet<&str>,
    state: &mut State,
) -> Result<()> {
    for declared in resources {
        if touched.contains(declared.key().as_str()) {
            state.record(declared)?;
        }
    }
    Ok(())
}

/// Which resources a command applies to: everything, one kind, or one resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub kind: Option<Kind>,
    pub name: Option<String>,
}

impl Target {
    /// Parse `kind` or `kind.name`
    pub fn parse(target: Option<&str>) -> Result<Self> {
        let Some(target) = target else {
            return Ok(Self::default());
        };

        let (kind, name) = match target.split_once('.') {
            Some((kind, name)) => (kind, Some(name)),
            None => (target, None),
        };

        let Some(kind) = Kind::parse(kind) else {
            let known: Vec<&str> = Kind::ALL.iter().map(|k| k.table()).collect();
            bail!(
                "Unknown resource kind '{}'. Expected one of: {}",
                kind,
                known.join(", ")
            );
        };

        if name.is_some_and(str::is_empty) {
            bail!("Empty resource name in target '{target}'");
        }

        Ok(Self {
            kind: Some(kind),
            name: name.map(String::from),
        })
    }

    pub fn matches(&self, kind: Kind, name: &str) -> bool {
        self.kind.is_none_or(|k| k == kind) && self.name.as_deref().is_none_or(|n| n == name)
    }

    pub fn includes(&self, kind: Kind) -> bool {
        self.kind.is_none_or(|k| k == kind)
    }
}
