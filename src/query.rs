//! A decoded query: constraints, order-bys, distinct mode, and limit/offset.
//! See SPEC_FULL.md §4.6, §6, §4.10.

use crate::chain::FilterOp;
use crate::error::EngineError;
use crate::value::{OwnedValue, SqlValue};

/// Whether (and how) the result should be deduplicated and/or sorted. See
/// SPEC_FULL.md §4.6 steps 4–6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderType {
    /// Plain `ORDER BY`.
    Sort,
    /// `SELECT DISTINCT ... ORDER BY`.
    DistinctAndSort,
    /// `SELECT DISTINCT` with no explicit order (the engine still sorts the
    /// distinct column to define a stable output order).
    Distinct,
}

/// A fully decoded query against one table. Built either directly (tests,
/// embedding callers) or via [`idx_str::decode`].
#[derive(Clone, Debug)]
pub struct Query {
    /// `(column, op, rhs)` triples, in the order the planner chose to apply
    /// them.
    pub constraints: Vec<(usize, FilterOp, OwnedValue)>,
    /// `(column, desc)` pairs, most significant first.
    pub orders: Vec<(usize, bool)>,
    /// Distinct/sort mode.
    pub order_type: OrderType,
    /// Bitmask of columns the query actually reads, as reported by the host
    /// (informational; not consulted by `query_to_row_map` itself).
    pub cols_used: u64,
    /// `LIMIT`, if present.
    pub limit: Option<u32>,
    /// `OFFSET` (0 if absent).
    pub offset: u32,
}

fn op_to_u32(op: FilterOp) -> u32 {
    match op {
        FilterOp::Eq => 0,
        FilterOp::Ne => 1,
        FilterOp::Lt => 2,
        FilterOp::Le => 3,
        FilterOp::Gt => 4,
        FilterOp::Ge => 5,
        FilterOp::IsNull => 6,
        FilterOp::IsNotNull => 7,
        FilterOp::Glob => 8,
        FilterOp::Regex => 9,
    }
}

fn op_from_u32(u: u32) -> Result<FilterOp, EngineError> {
    Ok(match u {
        0 => FilterOp::Eq,
        1 => FilterOp::Ne,
        2 => FilterOp::Lt,
        3 => FilterOp::Le,
        4 => FilterOp::Gt,
        5 => FilterOp::Ge,
        6 => FilterOp::IsNull,
        7 => FilterOp::IsNotNull,
        8 => FilterOp::Glob,
        9 => FilterOp::Regex,
        other => return Err(EngineError::MalformedIndexString(format!("unknown op code {other}"))),
    })
}

/// The `C<n>/O<m>/D<d>/U<u64>/L<0|1>/F<0|1>` index-string codec (SPEC_FULL.md
/// §6, §4.10).
pub mod idx_str {
    use super::*;

    /// Encode `query` into its index-string form, plus the positional argv
    /// of values the bridge would pass alongside it (constraint RHS values
    /// first, then `LIMIT`, then `OFFSET`, each only if present).
    ///
    /// `IS NULL`/`IS NOT NULL` constraints contribute no argv entry (there is
    /// no RHS to carry).
    pub fn encode(query: &Query) -> (String, Vec<OwnedValue>) {
        let mut s = String::new();
        let mut argv = Vec::new();

        s.push_str(&format!("C{}", query.constraints.len()));
        for (col, op, val) in &query.constraints {
            s.push_str(&format!(",{},{}", col, op_to_u32(*op)));
            if !matches!(op, FilterOp::IsNull | FilterOp::IsNotNull) {
                argv.push(val.clone());
            }
        }

        s.push_str(&format!(",O{}", query.orders.len()));
        for (col, desc) in &query.orders {
            s.push_str(&format!(",{},{}", col, *desc as u32));
        }

        let d = match query.order_type {
            OrderType::Sort => 0,
            OrderType::DistinctAndSort => 1,
            OrderType::Distinct => 2,
        };
        s.push_str(&format!(",D{d}"));
        s.push_str(&format!(",U{}", query.cols_used));
        s.push_str(&format!(",L{}", query.limit.is_some() as u32));
        s.push_str(&format!(",F{}", (query.offset != 0) as u32));

        if let Some(limit) = query.limit {
            argv.push(OwnedValue::Long(limit as i64));
        }
        if query.offset != 0 {
            argv.push(OwnedValue::Long(query.offset as i64));
        }

        (s, argv)
    }

    /// Decode an index string plus its argv back into a `Query`. `argv`
    /// values are converted from the wire `SqlValue` into the owned form,
    /// interning any strings into `pool`.
    pub fn decode(
        index_str: &str,
        argv: &[SqlValue],
        pool: &mut crate::string_pool::StringPool,
    ) -> Result<Query, EngineError> {
        let mut toks = index_str.split(',');
        let mut argv_pos = 0usize;

        let n = parse_prefixed(toks.next(), 'C')?;
        let mut constraints = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let col = parse_number(toks.next())? as usize;
            let op = op_from_u32(parse_number(toks.next())?)?;
            let val = if matches!(op, FilterOp::IsNull | FilterOp::IsNotNull) {
                OwnedValue::Null
            } else {
                let v = argv.get(argv_pos).ok_or_else(|| {
                    EngineError::MalformedIndexString("argv exhausted reading constraints".into())
                })?;
                argv_pos += 1;
                own(*v, pool)
            };
            constraints.push((col, op, val));
        }

        let m = parse_prefixed(toks.next(), 'O')?;
        let mut orders = Vec::with_capacity(m as usize);
        for _ in 0..m {
            let col = parse_number(toks.next())? as usize;
            let desc = parse_number(toks.next())? != 0;
            orders.push((col, desc));
        }

        let d = parse_prefixed(toks.next(), 'D')?;
        let order_type = match d {
            0 => OrderType::Sort,
            1 => OrderType::DistinctAndSort,
            2 => OrderType::Distinct,
            other => {
                return Err(EngineError::MalformedIndexString(format!(
                    "unknown distinct/order mode {other}"
                )))
            }
        };

        let cols_used = parse_prefixed(toks.next(), 'U')? as u64;
        let has_limit = parse_prefixed(toks.next(), 'L')? != 0;
        let has_offset = parse_prefixed(toks.next(), 'F')? != 0;

        let limit = if has_limit {
            let v = argv
                .get(argv_pos)
                .ok_or_else(|| EngineError::MalformedIndexString("argv exhausted reading LIMIT".into()))?;
            argv_pos += 1;
            Some(long_arg(*v, "LIMIT")?)
        } else {
            None
        };
        let offset = if has_offset {
            let v = argv
                .get(argv_pos)
                .ok_or_else(|| EngineError::MalformedIndexString("argv exhausted reading OFFSET".into()))?;
            long_arg(*v, "OFFSET")?
        } else {
            0
        };

        if toks.next().is_some() {
            return Err(EngineError::MalformedIndexString(
                "trailing tokens after OFFSET flag".into(),
            ));
        }

        Ok(Query {
            constraints,
            orders,
            order_type,
            cols_used,
            limit: limit.map(|l| l as u32),
            offset: offset as u32,
        })
    }

    fn own(v: SqlValue, pool: &mut crate::string_pool::StringPool) -> OwnedValue {
        match v {
            SqlValue::Null => OwnedValue::Null,
            SqlValue::Long(x) => OwnedValue::Long(x),
            SqlValue::Double(x) => OwnedValue::Double(x),
            SqlValue::String(s) => OwnedValue::String(pool.intern(s)),
            SqlValue::Bytes(b) => OwnedValue::Bytes(b.to_vec()),
        }
    }

    fn long_arg(v: SqlValue, which: &'static str) -> Result<i64, EngineError> {
        match v {
            SqlValue::Long(x) => Ok(x),
            _ => Err(EngineError::LimitOffsetNotLong { which }),
        }
    }

    fn parse_prefixed(tok: Option<&str>, prefix: char) -> Result<u32, EngineError> {
        let tok = tok.ok_or_else(|| {
            EngineError::MalformedIndexString(format!("expected token starting with {prefix:?}"))
        })?;
        let rest = tok.strip_prefix(prefix).ok_or_else(|| {
            EngineError::MalformedIndexString(format!("expected {prefix:?}, got {tok:?}"))
        })?;
        rest.parse()
            .map_err(|_| EngineError::MalformedIndexString(format!("bad integer in {tok:?}")))
    }

    fn parse_number(tok: Option<&str>) -> Result<u32, EngineError> {
        tok.ok_or_else(|| EngineError::MalformedIndexString("unexpected end of index string".into()))?
            .parse()
            .map_err(|_| EngineError::MalformedIndexString("bad integer token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string_pool::StringPool;

    #[test]
    fn round_trip_simple_query() {
        let mut pool = StringPool::new();
        let name = pool.intern("frame");
        let query = Query {
            constraints: vec![
                (0, FilterOp::Eq, OwnedValue::Long(42)),
                (2, FilterOp::IsNotNull, OwnedValue::Null),
                (1, FilterOp::Eq, OwnedValue::String(name)),
            ],
            orders: vec![(1, true)],
            order_type: OrderType::Sort,
            cols_used: 0b110,
            limit: Some(10),
            offset: 5,
        };
        let (s, _argv_owned) = idx_str::encode(&query);
        // Built independently of `pool`'s borrow so the test can still pass
        // `&mut pool` to `decode` below; matches the argv `encode` produced.
        let argv: Vec<SqlValue> = vec![
            SqlValue::Long(42),
            SqlValue::String("frame"),
            SqlValue::Long(10),
            SqlValue::Long(5),
        ];
        let decoded = idx_str::decode(&s, &argv, &mut pool).unwrap();

        assert_eq!(decoded.constraints.len(), 3);
        assert_eq!(decoded.orders, vec![(1, true)]);
        assert_eq!(decoded.order_type, OrderType::Sort);
        assert_eq!(decoded.cols_used, 0b110);
        assert_eq!(decoded.limit, Some(10));
        assert_eq!(decoded.offset, 5);
    }

    #[test]
    fn decode_rejects_malformed_prefix() {
        let mut pool = StringPool::new();
        let err = idx_str::decode("X0,O0,D0,U0,L0,F0", &[], &mut pool);
        assert!(err.is_err());
    }

    #[test]
    fn decode_rejects_non_long_limit() {
        let mut pool = StringPool::new();
        let err = idx_str::decode("C0,O0,D0,U0,L1,F0", &[SqlValue::String("nope")], &mut pool);
        assert!(matches!(err, Err(EngineError::LimitOffsetNotLong { which: "LIMIT" })));
    }
}
