use crate::error::Trap;
use crate::model::Value;

/// Host function callable from wasm. Arguments arrive marshalled per the
/// declared signature; at most one return value in MVP. A host that
/// refuses to produce a result returns a `Trap`.
pub type HostFunc = dyn Fn(&[Value]) -> Result<Option<Value>, Trap> + Send + Sync;
