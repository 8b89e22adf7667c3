//! Planning - observe every selected resource without changing anything

use anyhow::Result;
use reconcile::{
    Action, Adapter, CancelToken, Connector, DeclaredOf, Error, ResourceDiff, plan,
};

use super::executor::{ClientFactory, Engine};
use super::{Inventory, Target};
use crate::kinds::Kind;
use crate::references;

/// Result of planning one resource: what a pass would do, or why it can't tell
pub type Planned = (String, Result<ResourceDiff, Error>);

impl<F: ClientFactory> Engine<'_, F> {
    /// Observe the selected resources and report what `apply` would change.
    ///
    /// References are resolved on snapshots against the ids already known,
    /// so a resource whose target is still to be created reports the
    /// reference as unresolvable.
    pub fn plan(
        &self,
        inventory: &Inventory,
        target: &Target,
        jobs: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Planned>> {
        let mut planned = Vec::new();

        for kind in Kind::ALL {
            if !target.includes(kind) {
                continue;
            }
            let batch = match kind {
                Kind::BillableMetric => plan_kind(
                    &self.metrics(),
                    &inventory.billable_metrics,
                    kind,
                    target,
                    |_| Ok(()),
                    jobs,
                    cancel,
                )?,
                Kind::CustomFieldKey => plan_kind(
                    &self.custom_field_keys(),
                    &inventory.custom_field_keys,
                    kind,
                    target,
                    |_| Ok(()),
                    jobs,
                    cancel,
                )?,
                Kind::Product => plan_kind(
                    &self.products(),
                    &inventory.products,
                    kind,
                    target,
                    |p| {
                        if p.is_deleting() {
                            return Ok(());
                        }
                        references::resolve_product(p.parameters_mut(), &inventory.billable_metrics)
                    },
                    jobs,
                    cancel,
                )?,
                Kind::RateCard => plan_kind(
                    &self.rate_cards(),
                    &inventory.rate_cards,
                    kind,
                    target,
                    |_| Ok(()),
                    jobs,
                    cancel,
                )?,
                Kind::Rate => plan_kind(
                    &self.rates(),
                    &inventory.rates,
                    kind,
                    target,
                    |r| {
                        if r.is_deleting() {
                            return Ok(());
                        }
                        references::resolve_rate(
                            r.parameters_mut(),
                            &inventory.rate_cards,
                            &inventory.products,
                        )
                    },
                    jobs,
                    cancel,
                )?,
            };
            planned.extend(batch);
        }

        Ok(planned)
    }
}

fn plan_kind<A, R>(
    connector: &Connector<'_, A>,
    resources: &[DeclaredOf<A>],
    kind: Kind,
    target: &Target,
    prepare: R,
    jobs: usize,
    cancel: &CancelToken,
) -> Result<Vec<Planned>>
where
    A: Adapter + 'static,
    R: Fn(&mut DeclaredOf<A>) -> Result<(), Error>,
{
    let mut planned = Vec::new();
    let mut batch = Vec::new();

    for declared in resources.iter().filter(|r| target.matches(kind, r.name())) {
        let mut snapshot = declared.clone();
        match prepare(&mut snapshot) {
            Ok(()) => batch.push(snapshot),
            Err(e) => planned.push((declared.key(), Err(e))),
        }
    }

    if !batch.is_empty() {
        planned.extend(plan(connector, &batch, jobs, cancel)?);
    }
    Ok(planned)
}

/// Diffs that call for a change
pub fn pending(planned: &[Planned]) -> Vec<&ResourceDiff> {
    planned
        .iter()
        .filter_map(|(_, result)| result.as_ref().ok())
        .filter(|diff| diff.action != Action::None)
        .collect()
}
