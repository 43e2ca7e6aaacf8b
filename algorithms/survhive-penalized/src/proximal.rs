//! Proximal operators of sparsity inducing penalties
//!
//! Every operator maps a coefficient vector to its shrunken version for a fixed threshold,
//! usually the penalty strength times the step size of the optimiser. Group variants act on the
//! L2 norm of each group and either zero the whole group or rescale it.
use ndarray::Array1;
use survhive::Float;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{Result, SurvivalError};

/// Shrink a coefficient vector
pub trait ProximalOperator<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F>;
}

/// Partition of the features into non-overlapping groups
///
/// Every feature belongs to exactly one group.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Groups(Vec<Vec<usize>>);

impl Groups {
    /// Validate that `groups` partitions `0..n_features`
    pub fn new(groups: Vec<Vec<usize>>, n_features: usize) -> Result<Self> {
        let mut seen = vec![false; n_features];
        for (g, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(SurvivalError::InvalidGroups(format!("group {} is empty", g)));
            }
            for &j in group {
                match seen.get_mut(j) {
                    None => {
                        return Err(SurvivalError::InvalidGroups(format!(
                            "feature {} of group {} out of range for {} features",
                            j, g, n_features
                        )))
                    }
                    Some(true) => {
                        return Err(SurvivalError::InvalidGroups(format!(
                            "feature {} appears in more than one group",
                            j
                        )))
                    }
                    Some(s) => *s = true,
                }
            }
        }
        if let Some(j) = seen.iter().position(|s| !s) {
            return Err(SurvivalError::InvalidGroups(format!(
                "feature {} is not assigned to a group",
                j
            )));
        }

        Ok(Groups(groups))
    }

    /// Groups from a label per feature, labels are ordered by first appearance
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut order: Vec<usize> = Vec::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (j, label) in labels.iter().enumerate() {
            match order.iter().position(|l| l == label) {
                Some(g) => groups[g].push(j),
                None => {
                    order.push(*label);
                    groups.push(vec![j]);
                }
            }
        }
        Groups(groups)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.0.iter().map(|g| g.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.0.iter().map(|g| g.as_slice())
    }
}

fn soft_threshold<F: Float>(x: F, threshold: F) -> F {
    x.signum() * (x.abs() - threshold).max(F::zero())
}

fn scad_threshold<F: Float>(x: F, threshold: F, a: F) -> F {
    let z = x.abs();
    if z <= F::cast(2.) * threshold {
        soft_threshold(x, threshold)
    } else if z <= a * threshold {
        ((a - F::one()) * x - x.signum() * a * threshold) / (a - F::cast(2.))
    } else {
        x
    }
}

fn mcp_threshold<F: Float>(x: F, threshold: F, gamma: F) -> F {
    if x.abs() <= gamma * threshold {
        gamma / (gamma - F::one()) * soft_threshold(x, threshold)
    } else {
        x
    }
}

/// Apply a scalar shrinkage rule to the L2 norm of every group
fn shrink_groups<F: Float>(
    mut coef: Array1<F>,
    groups: &Groups,
    rule: impl Fn(F) -> F,
) -> Array1<F> {
    for group in groups.iter() {
        let norm = group
            .iter()
            .map(|&j| coef[j] * coef[j])
            .sum::<F>()
            .sqrt();
        let scale = if norm > F::zero() {
            rule(norm) / norm
        } else {
            F::zero()
        };
        for &j in group {
            coef[j] *= scale;
        }
    }
    coef
}

#[derive(Clone, Debug, PartialEq)]
pub struct LassoProximal<F> {
    pub threshold: F,
}

impl<F: Float> ProximalOperator<F> for LassoProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        coef.mapv_into(|x| soft_threshold(x, self.threshold))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupLassoProximal<F> {
    pub threshold: F,
    pub groups: Groups,
}

impl<F: Float> ProximalOperator<F> for GroupLassoProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        shrink_groups(coef, &self.groups, |z| (z - self.threshold).max(F::zero()))
    }
}

/// Lasso shrinkage with `mix · threshold` followed by group shrinkage with
/// `(1 - mix) · threshold`
#[derive(Clone, Debug, PartialEq)]
pub struct SparseGroupLassoProximal<F> {
    pub threshold: F,
    pub mix: F,
    pub groups: Groups,
}

impl<F: Float> ProximalOperator<F> for SparseGroupLassoProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        let lasso = LassoProximal {
            threshold: self.threshold * self.mix,
        };
        let group = (F::one() - self.mix) * self.threshold;
        shrink_groups(lasso.apply(coef), &self.groups, |z| {
            (z - group).max(F::zero())
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScadProximal<F> {
    pub threshold: F,
    pub a: F,
}

impl<F: Float> ProximalOperator<F> for ScadProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        coef.mapv_into(|x| scad_threshold(x, self.threshold, self.a))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupScadProximal<F> {
    pub threshold: F,
    pub a: F,
    pub groups: Groups,
}

impl<F: Float> ProximalOperator<F> for GroupScadProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        shrink_groups(coef, &self.groups, |z| scad_threshold(z, self.threshold, self.a))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct McpProximal<F> {
    pub threshold: F,
    pub gamma: F,
}

impl<F: Float> ProximalOperator<F> for McpProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        coef.mapv_into(|x| mcp_threshold(x, self.threshold, self.gamma))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroupMcpProximal<F> {
    pub threshold: F,
    pub gamma: F,
    pub groups: Groups,
}

impl<F: Float> ProximalOperator<F> for GroupMcpProximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        shrink_groups(coef, &self.groups, |z| mcp_threshold(z, self.threshold, self.gamma))
    }
}

/// Group exponential lasso
///
/// Every group is shrunk like the group lasso, with the threshold decaying in the L1 norm of the
/// group: `threshold · exp(-tau / threshold · ‖g‖₁)`. Strong groups are penalized less.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupExponentialLassoProximal<F> {
    pub threshold: F,
    pub tau: F,
    pub groups: Groups,
}

impl<F: Float> GroupExponentialLassoProximal<F> {
    fn group_threshold(&self, l1_norm: F) -> F {
        if self.threshold > F::zero() {
            self.threshold * (-self.tau / self.threshold * l1_norm).exp()
        } else {
            F::zero()
        }
    }
}

impl<F: Float> ProximalOperator<F> for GroupExponentialLassoProximal<F> {
    fn apply(&self, mut coef: Array1<F>) -> Array1<F> {
        for group in self.groups.iter() {
            let l1_norm = group.iter().map(|&j| coef[j].abs()).sum::<F>();
            let threshold = self.group_threshold(l1_norm);
            let norm = group
                .iter()
                .map(|&j| coef[j] * coef[j])
                .sum::<F>()
                .sqrt();
            let scale = if norm > F::zero() {
                (norm - threshold).max(F::zero()) / norm
            } else {
                F::zero()
            };
            for &j in group {
                coef[j] *= scale;
            }
        }
        coef
    }
}

/// Any of the proximal operators, selected by a [`Penalty`]
#[derive(Clone, Debug, PartialEq)]
pub enum Proximal<F> {
    Lasso(LassoProximal<F>),
    GroupLasso(GroupLassoProximal<F>),
    SparseGroupLasso(SparseGroupLassoProximal<F>),
    Scad(ScadProximal<F>),
    GroupScad(GroupScadProximal<F>),
    Mcp(McpProximal<F>),
    GroupMcp(GroupMcpProximal<F>),
    GroupExponentialLasso(GroupExponentialLassoProximal<F>),
}

impl<F: Float> ProximalOperator<F> for Proximal<F> {
    fn apply(&self, coef: Array1<F>) -> Array1<F> {
        match self {
            Proximal::Lasso(p) => p.apply(coef),
            Proximal::GroupLasso(p) => p.apply(coef),
            Proximal::SparseGroupLasso(p) => p.apply(coef),
            Proximal::Scad(p) => p.apply(coef),
            Proximal::GroupScad(p) => p.apply(coef),
            Proximal::Mcp(p) => p.apply(coef),
            Proximal::GroupMcp(p) => p.apply(coef),
            Proximal::GroupExponentialLasso(p) => p.apply(coef),
        }
    }
}

/// Sparsity inducing penalty applied to the coefficients
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Penalty {
    /// L1 penalty, mixed with a ridge penalty by `l1_ratio`
    Lasso,
    GroupLasso,
    /// Mixture of lasso (`mix`) and group lasso (`1 - mix`)
    SparseGroupLasso { mix: f64 },
    /// Smoothly clipped absolute deviation with shape `a > 2`
    Scad { a: f64 },
    GroupScad { a: f64 },
    /// Minimax concave penalty with shape `gamma > 1`
    Mcp { gamma: f64 },
    GroupMcp { gamma: f64 },
    /// Group lasso with a threshold decaying at rate `tau > 0` in the group's L1 norm
    GroupExponentialLasso { tau: f64 },
}

impl Default for Penalty {
    fn default() -> Self {
        Penalty::Lasso
    }
}

impl Penalty {
    /// SCAD with the conventional shape `a = 3.7`
    pub fn scad() -> Self {
        Penalty::Scad { a: 3.7 }
    }

    /// MCP with the conventional shape `gamma = 4`
    pub fn mcp() -> Self {
        Penalty::Mcp { gamma: 4.0 }
    }

    /// Group exponential lasso with `tau = 1/3`
    pub fn group_exponential_lasso() -> Self {
        Penalty::GroupExponentialLasso { tau: 1.0 / 3.0 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Penalty::Lasso => "lasso",
            Penalty::GroupLasso => "group lasso",
            Penalty::SparseGroupLasso { .. } => "sparse group lasso",
            Penalty::Scad { .. } => "SCAD",
            Penalty::GroupScad { .. } => "group SCAD",
            Penalty::Mcp { .. } => "MCP",
            Penalty::GroupMcp { .. } => "group MCP",
            Penalty::GroupExponentialLasso { .. } => "group exponential lasso",
        }
    }

    pub fn needs_groups(&self) -> bool {
        matches!(
            self,
            Penalty::GroupLasso
                | Penalty::SparseGroupLasso { .. }
                | Penalty::GroupScad { .. }
                | Penalty::GroupMcp { .. }
                | Penalty::GroupExponentialLasso { .. }
        )
    }

    /// Check the shape parameters and the presence of groups
    pub fn validate(&self, groups: Option<&Groups>) -> Result<()> {
        match *self {
            Penalty::SparseGroupLasso { mix } if !(0.0..=1.0).contains(&mix) => {
                return Err(SurvivalError::InvalidPenaltyShape(format!(
                    "sparse group lasso mix {} not in [0, 1]",
                    mix
                )))
            }
            Penalty::Scad { a } | Penalty::GroupScad { a } if !(a > 2.0 && a.is_finite()) => {
                return Err(SurvivalError::InvalidPenaltyShape(format!(
                    "SCAD needs a > 2, got {}",
                    a
                )))
            }
            Penalty::Mcp { gamma } | Penalty::GroupMcp { gamma }
                if !(gamma > 1.0 && gamma.is_finite()) =>
            {
                return Err(SurvivalError::InvalidPenaltyShape(format!(
                    "MCP needs gamma > 1, got {}",
                    gamma
                )))
            }
            Penalty::GroupExponentialLasso { tau } if !(tau > 0.0 && tau.is_finite()) => {
                return Err(SurvivalError::InvalidPenaltyShape(format!(
                    "group exponential lasso needs tau > 0, got {}",
                    tau
                )))
            }
            _ => {}
        }
        if self.needs_groups() && groups.is_none() {
            return Err(SurvivalError::MissingGroups(self.name()));
        }

        Ok(())
    }

    /// Build the proximal operator for a threshold
    pub fn proximal<F: Float>(&self, threshold: F, groups: Option<&Groups>) -> Result<Proximal<F>> {
        self.validate(groups)?;
        let owned_groups = || groups.cloned().ok_or(SurvivalError::MissingGroups(self.name()));

        Ok(match *self {
            Penalty::Lasso => Proximal::Lasso(LassoProximal { threshold }),
            Penalty::GroupLasso => Proximal::GroupLasso(GroupLassoProximal {
                threshold,
                groups: owned_groups()?,
            }),
            Penalty::SparseGroupLasso { mix } => {
                Proximal::SparseGroupLasso(SparseGroupLassoProximal {
                    threshold,
                    mix: F::cast(mix),
                    groups: owned_groups()?,
                })
            }
            Penalty::Scad { a } => Proximal::Scad(ScadProximal {
                threshold,
                a: F::cast(a),
            }),
            Penalty::GroupScad { a } => Proximal::GroupScad(GroupScadProximal {
                threshold,
                a: F::cast(a),
                groups: owned_groups()?,
            }),
            Penalty::Mcp { gamma } => Proximal::Mcp(McpProximal {
                threshold,
                gamma: F::cast(gamma),
            }),
            Penalty::GroupMcp { gamma } => Proximal::GroupMcp(GroupMcpProximal {
                threshold,
                gamma: F::cast(gamma),
                groups: owned_groups()?,
            }),
            Penalty::GroupExponentialLasso { tau } => {
                Proximal::GroupExponentialLasso(GroupExponentialLassoProximal {
                    threshold,
                    tau: F::cast(tau),
                    groups: owned_groups()?,
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn groups() -> Groups {
        Groups::new(vec![vec![0, 1], vec![2, 3, 4]], 5).unwrap()
    }

    #[test]
    fn lasso_is_identity_at_zero_threshold() {
        let x = array![1.5, -0.2, 0.0, 3.0];
        let prox = LassoProximal { threshold: 0.0 };
        assert_abs_diff_eq!(prox.apply(x.clone()), x);
    }

    #[test]
    fn lasso_zeroes_small_entries() {
        let prox = LassoProximal { threshold: 0.5 };
        assert_abs_diff_eq!(
            prox.apply(array![0.5, -0.4, 1.5, -2.0, 0.0]),
            array![0.0, 0.0, 1.0, -1.5, 0.0]
        );
    }

    #[test]
    fn group_lasso_zeroes_whole_groups() {
        let prox = GroupLassoProximal {
            threshold: 1.0,
            groups: groups(),
        };
        // norm of the first group is 0.5, of the second 5
        let out = prox.apply(array![0.3, 0.4, 3.0, 0.0, 4.0]);
        assert_abs_diff_eq!(out, array![0.0, 0.0, 2.4, 0.0, 3.2], epsilon = 1e-12);

        // a large entry keeps even the small members of its group
        let out = prox.apply(array![0.0, 0.0, 5.0, 0.01, 0.0]);
        assert!(out[3] != 0.0);
    }

    #[test]
    fn sparse_group_lasso_composes_both_steps() {
        let prox = SparseGroupLassoProximal {
            threshold: 1.0,
            mix: 0.5,
            groups: groups(),
        };
        // lasso with 0.5 gives [0, 0, 2.5, 0, 3.5], group with 0.5 scales by 1 - 0.5 / ‖·‖
        let out = prox.apply(array![0.3, -0.4, 3.0, 0.2, 4.0]);
        let norm = (2.5f64 * 2.5 + 3.5 * 3.5).sqrt();
        let scale = 1.0 - 0.5 / norm;
        assert_abs_diff_eq!(
            out,
            array![0.0, 0.0, 2.5 * scale, 0.0, 3.5 * scale],
            epsilon = 1e-12
        );
    }

    #[test]
    fn scad_regions() {
        let prox = ScadProximal {
            threshold: 1.0,
            a: 3.7,
        };
        let out = prox.apply(array![0.5, 1.5, -3.0, 5.0]);
        let middle = -(2.7 * 3.0 - 3.7) / 1.7;
        assert_abs_diff_eq!(out, array![0.0, 0.5, middle, 5.0], epsilon = 1e-12);

        // continuous at the region borders
        let lower = prox.apply(array![2.0, 3.7]);
        assert_abs_diff_eq!(lower, array![1.0, 3.7], epsilon = 1e-12);
    }

    #[test]
    fn mcp_keeps_sign_and_large_values() {
        let prox = McpProximal {
            threshold: 1.0,
            gamma: 4.0,
        };
        let out = prox.apply(array![-3.0, 0.8, 2.0, 6.0, -6.0]);
        assert_abs_diff_eq!(
            out,
            array![-8.0 / 3.0, 0.0, 4.0 / 3.0, 6.0, -6.0],
            epsilon = 1e-12
        );
    }

    #[test]
    fn group_mcp_rescales_group() {
        let prox = GroupMcpProximal {
            threshold: 1.0,
            gamma: 4.0,
            groups: groups(),
        };
        // second group has norm 2, shrunk to 4/3 · (2 - 1)
        let out = prox.apply(array![10.0, 0.0, 0.0, 2.0, 0.0]);
        assert_abs_diff_eq!(out, array![10.0, 0.0, 0.0, 4.0 / 3.0, 0.0], epsilon = 1e-12);
    }

    #[test]
    fn group_scad_zeroes_small_group() {
        let prox = GroupScadProximal {
            threshold: 1.0,
            a: 3.7,
            groups: groups(),
        };
        let out = prox.apply(array![0.6, 0.8, 0.0, 0.0, 9.0]);
        assert_abs_diff_eq!(out, array![0.0, 0.0, 0.0, 0.0, 9.0], epsilon = 1e-12);
    }

    #[test]
    fn group_exponential_lasso_spares_strong_groups() {
        let prox = GroupExponentialLassoProximal {
            threshold: 1.0,
            tau: 0.5,
            groups: groups(),
        };
        // first group: l1 0.7, l2 0.5, threshold exp(-0.35) ≈ 0.705 zeroes it
        // second group: l1 7, l2 5, threshold exp(-3.5) shrinks it only slightly
        let out = prox.apply(array![0.3, 0.4, 3.0, 0.0, 4.0]);
        let scale = 1.0 - (-3.5f64).exp() / 5.0;
        assert_abs_diff_eq!(
            out,
            array![0.0, 0.0, 3.0 * scale, 0.0, 4.0 * scale],
            epsilon = 1e-12
        );

        // a larger tau lowers the threshold of every group
        let weak = GroupExponentialLassoProximal {
            threshold: 1.0,
            tau: 5.0,
            groups: groups(),
        };
        let out = weak.apply(array![0.3, 0.4, 3.0, 0.0, 4.0]);
        let scale = 1.0 - (-3.5f64).exp() / 0.5;
        assert_abs_diff_eq!(out[0], 0.3 * scale, epsilon = 1e-12);
        assert_abs_diff_eq!(out[1], 0.4 * scale, epsilon = 1e-12);

        let zero = GroupExponentialLassoProximal {
            threshold: 0.0,
            tau: 0.5,
            groups: groups(),
        };
        let x = array![0.0, 0.0, 1.0, -2.0, 0.5];
        assert_abs_diff_eq!(zero.apply(x.clone()), x);
    }

    #[test]
    fn groups_are_validated() {
        assert!(Groups::new(vec![vec![0, 1], vec![1, 2]], 3).is_err());
        assert!(Groups::new(vec![vec![0, 1]], 3).is_err());
        assert!(Groups::new(vec![vec![0, 3]], 2).is_err());
        assert!(Groups::new(vec![vec![0], vec![]], 1).is_err());
        let labels = Groups::from_labels(&[2, 0, 2, 1]);
        assert_eq!(labels, Groups::new(vec![vec![0, 2], vec![1], vec![3]], 4).unwrap());
    }

    #[test]
    fn penalty_builds_operators() {
        let prox = Penalty::Lasso.proximal(0.5f64, None).unwrap();
        assert!(matches!(prox, Proximal::Lasso(_)));

        assert!(matches!(
            Penalty::GroupLasso.proximal(0.5f64, None),
            Err(SurvivalError::MissingGroups(_))
        ));
        assert!(Penalty::Scad { a: 2.0 }.proximal(0.5f64, None).is_err());
        assert!(Penalty::Mcp { gamma: 1.0 }.proximal(0.5f64, None).is_err());
        assert!(Penalty::SparseGroupLasso { mix: 1.5 }
            .proximal(0.5f64, Some(&groups()))
            .is_err());

        assert!(Penalty::GroupExponentialLasso { tau: 0.0 }
            .proximal(0.5f64, Some(&groups()))
            .is_err());
        assert!(matches!(
            Penalty::group_exponential_lasso().proximal(0.5f64, None),
            Err(SurvivalError::MissingGroups(_))
        ));
        assert!(matches!(
            Penalty::group_exponential_lasso().proximal(0.5f64, Some(&groups())),
            Ok(Proximal::GroupExponentialLasso(_))
        ));

        let prox = Penalty::GroupMcp { gamma: 3.0 }
            .proximal(0.5f64, Some(&groups()))
            .unwrap();
        assert_abs_diff_eq!(prox.apply(Array1::zeros(5)), Array1::<f64>::zeros(5));
    }
}
