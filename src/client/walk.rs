//! Subtree walks.

use std::slice;

use super::session::Session;
use crate::error::{Error, ErrorStatus, Result, WalkAbortReason};
use crate::oid::Oid;
use crate::transport::Transport;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// Request used for each step of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WalkMethod {
    GetNext,
    GetBulk { non_repeaters: i32, max_repetitions: i32 },
}

impl WalkMethod {
    /// GETNEXT on v1, GETBULK from v2c on.
    pub(crate) fn for_version(version: Version, max_repetitions: i32) -> Self {
        if version.supports_bulk() {
            Self::GetBulk {
                non_repeaters: 0,
                max_repetitions,
            }
        } else {
            Self::GetNext
        }
    }
}

/// Collect every varbind under `root`.
///
/// The walk ends on the first OID outside the subtree, on endOfMibView, on
/// an empty response, or on a v1 noSuchName. An OID that does not sort
/// after its predecessor aborts with [`WalkAbortReason::NonIncreasing`];
/// collecting more than `ceiling` varbinds aborts with
/// [`WalkAbortReason::IterationCeiling`].
pub(crate) async fn walk<T: Transport>(
    session: &mut Session<T>,
    root: &Oid,
    method: WalkMethod,
    ceiling: usize,
) -> Result<Vec<VarBind>> {
    let target = session.target();
    let mut results = Vec::new();
    let mut current = root.clone();
    let mut rounds = 0usize;

    'walk: loop {
        rounds += 1;
        let response = match method {
            WalkMethod::GetNext => session.get_next(slice::from_ref(&current)).await,
            WalkMethod::GetBulk {
                non_repeaters,
                max_repetitions,
            } => session.get_bulk(non_repeaters, max_repetitions, slice::from_ref(&current)).await,
        };
        let pdu = match response {
            Ok(pdu) => pdu,
            Err(e) if session.version() == Version::V1 && is_no_such_name(&e) => break,
            Err(e) => return Err(e),
        };
        if pdu.varbinds.is_empty() {
            tracing::debug!(target: "snmp_monitor::client", { snmp.target = %target, snmp.oid = %current }, "empty walk response");
            break;
        }

        for vb in pdu.varbinds {
            if matches!(vb.value, Value::EndOfMibView) || !vb.oid.starts_with(root) {
                break 'walk;
            }
            if vb.oid <= current {
                tracing::warn!(target: "snmp_monitor::client", { snmp.target = %target, previous = %current, returned = %vb.oid }, "agent returned a non-increasing OID");
                return Err(Error::WalkAborted {
                    target,
                    reason: WalkAbortReason::NonIncreasing,
                }
                .boxed());
            }
            if results.len() >= ceiling {
                tracing::warn!(target: "snmp_monitor::client", { snmp.target = %target, snmp.oid = %root, limit = ceiling }, "walk ceiling reached");
                return Err(Error::WalkAborted {
                    target,
                    reason: WalkAbortReason::IterationCeiling { limit: ceiling },
                }
                .boxed());
            }
            current = vb.oid.clone();
            results.push(vb);
        }
    }

    tracing::debug!(target: "snmp_monitor::client", { snmp.target = %target, snmp.oid = %root, snmp.varbind_count = results.len(), rounds }, "walk complete");
    Ok(results)
}

fn is_no_such_name(error: &Error) -> bool {
    matches!(
        error,
        Error::Snmp {
            status: ErrorStatus::NoSuchName,
            ..
        }
    )
}
