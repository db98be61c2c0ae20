//! Decides, per setting, whether the current file value should be shown to
//! the operator.

use serde::Serialize;
use tracing::{debug, info};

use crate::conf::{ConfFile, ParsedLine};
use crate::recommend::RecommendError;
use crate::settings::{GroupId, SettingSpec, SettingsGroup, ValueKind};
use crate::snapshot::ResourceSnapshot;
use crate::units::{FormatError, canonical_to_bytes, parse_duration};

/// Relative distance from the recommendation that still counts as tuned.
pub const FUDGE_FACTOR: f64 = 0.05;

/// Why a setting is shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// The key does not appear in the file.
    Missing,
    /// The value is close enough but the line is commented out.
    Commented,
    /// The value differs from the recommendation by more than [`FUDGE_FACTOR`].
    OutOfTolerance,
    /// The current value could not be parsed.
    Unparsable,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Decision {
    pub key: &'static str,
    pub visible: bool,
    /// Set for visible decisions only.
    pub reason: Option<Reason>,
    /// Raw value from the file, if the key is present.
    pub current: Option<String>,
    pub recommended: String,
}

/// Decisions for one group, in key order.
#[derive(Clone, Debug, Serialize)]
pub struct GroupDecisions {
    pub group: GroupId,
    pub label: &'static str,
    pub decisions: Vec<Decision>,
}

impl GroupDecisions {
    pub fn visible(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.visible)
    }

    /// No setting in the group needs attention.
    pub fn is_tuned(&self) -> bool {
        self.visible().next().is_none()
    }
}

/// Parses a raw file value for comparison. Surrounding single quotes are
/// removed first.
pub fn parse_value(raw: &str, kind: ValueKind) -> Result<f64, FormatError> {
    let value = raw
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(raw);

    match kind {
        ValueKind::Bytes => canonical_to_bytes(value).map(|b| b as f64),
        ValueKind::Duration(unit) => parse_duration(value, unit),
        ValueKind::Integer => value
            .parse::<i64>()
            .map(|v| v as f64)
            .map_err(|_| FormatError::new(value, "expected an integer")),
        ValueKind::Float => match value.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(FormatError::new(value, "expected a number")),
        },
    }
}

/// `|target - current| / target <= FUDGE_FACTOR`.
pub fn is_close_enough(target: f64, current: f64) -> bool {
    if target == 0.0 {
        return current == 0.0;
    }
    ((target - current).abs() / target.abs()) <= FUDGE_FACTOR
}

/// Decides visibility for one key given its line (if any) and recommendation.
///
/// Fails only if `recommended` itself doesn't parse, which means a recommender
/// produced a value in the wrong format.
pub fn decide_setting(
    spec: &SettingSpec,
    parsed: Option<&ParsedLine>,
    recommended: String,
) -> Result<Decision, FormatError> {
    let target = parse_value(&recommended, spec.kind)?;

    let Some(parsed) = parsed else {
        return Ok(Decision {
            key: spec.key,
            visible: true,
            reason: Some(Reason::Missing),
            current: None,
            recommended,
        });
    };

    let reason = match parse_value(&parsed.value, spec.kind) {
        Err(e) => {
            debug!("{}: {}", spec.key, e);
            Some(Reason::Unparsable)
        }
        Ok(current) if !is_close_enough(target, current) => Some(Reason::OutOfTolerance),
        Ok(_) if parsed.commented => Some(Reason::Commented),
        Ok(_) => None,
    };

    Ok(Decision {
        key: spec.key,
        visible: reason.is_some(),
        reason,
        current: Some(parsed.value.clone()),
        recommended,
    })
}

/// Computes decisions for every key of `group`.
///
/// Returns `Ok(None)` when the group's recommender is unavailable for the
/// snapshot. Keys the profile leaves alone are omitted.
pub fn decide_group(
    group: &SettingsGroup,
    conf: &ConfFile,
    snapshot: &ResourceSnapshot,
) -> Result<Option<GroupDecisions>, RecommendError> {
    let recommender = group.recommender(snapshot);
    if !recommender.is_available() {
        info!("skipping {} settings: not applicable to this host", group.label());
        return Ok(None);
    }

    let mut decisions = Vec::with_capacity(group.keys.len());
    for spec in &group.keys {
        let Some(recommended) = recommender.recommend(spec.key)? else {
            debug!("{}: no recommendation for profile {}", spec.key, snapshot.profile);
            continue;
        };
        decisions.push(decide_setting(spec, conf.setting(spec.key), recommended)?);
    }

    let result = GroupDecisions {
        group: group.id,
        label: group.label(),
        decisions,
    };
    debug!(
        "{}: {} of {} settings need attention",
        result.label,
        result.visible().count(),
        result.decisions.len()
    );
    Ok(Some(result))
}
