use serde_json::Value;

/// Path-based access over a parsed JSON document.
///
/// Inbound frames carry a heterogeneous `data` object that changes with every
/// action, so handlers read it with typed getters (`.string()`, `.int()`, …)
/// instead of one static schema per action. Missing paths coerce to zero
/// values, like the rest of the protocol expects.
#[derive(Clone, Copy)]
pub struct Js<'a>(Option<&'a Value>);

impl<'a> Js<'a> {
    pub fn new(v: &'a Value) -> Js<'a> {
        Js(Some(v))
    }

    /// Descends along a dot-separated path; array segments are indices.
    pub fn get(self, path: &str) -> Js<'a> {
        let mut cur = self.0;
        for seg in path.split('.') {
            cur = match cur {
                Some(Value::Object(map)) => map.get(seg),
                Some(Value::Array(arr)) => seg.parse::<usize>().ok().and_then(|i| arr.get(i)),
                _ => None,
            };
        }
        Js(cur)
    }

    pub fn exists(self) -> bool {
        self.0.is_some()
    }

    pub fn string(self) -> String {
        match self.0 {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn int(self) -> i64 {
        match self.0 {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn bool(self) -> bool {
        matches!(self.0, Some(Value::Bool(true)))
    }

    pub fn each(self, mut f: impl FnMut(Js<'a>)) {
        if let Some(Value::Array(arr)) = self.0 {
            for v in arr {
                f(Js(Some(v)));
            }
        }
    }

    pub fn raw(self) -> Value {
        self.0.cloned().unwrap_or(Value::Null)
    }
}

/// Shallow object merge; keys of `b` win.
pub fn merge(mut a: Value, b: Value) -> Value {
    match (&mut a, b) {
        (Value::Object(x), Value::Object(y)) => {
            for (k, v) in y {
                x.insert(k, v);
            }
            a
        }
        (_, b) => b,
    }
}
