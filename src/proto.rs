use serde_json::Value;

/// Logical database-service operations
///
/// Version 6 renamed the database service methods with an `exp_` prefix and
/// dropped the leading admin-password argument. The mapping from logical
/// operation to wire shape lives here so the transport picks it once, at
/// configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbMethod {
    Create,
    GetProgress,
    Drop,
}

impl DbMethod {
    /// Wire method name for the given server major version
    pub fn wire_name(self, version: u32) -> &'static str {
        match (self, version >= 6) {
            (DbMethod::Create, false) => "create",
            (DbMethod::Create, true) => "exp_create",
            (DbMethod::GetProgress, false) => "get_progress",
            (DbMethod::GetProgress, true) => "exp_get_progress",
            (DbMethod::Drop, false) => "drop",
            (DbMethod::Drop, true) => "exp_drop",
        }
    }

    /// Wire argument list for the given server major version
    ///
    /// Pre-6 servers expect the admin password as the first positional
    /// argument; 6+ servers authenticate at the dispatch layer instead.
    pub fn wire_args(self, version: u32, admin_passwd: &str, rest: Vec<Value>) -> Vec<Value> {
        if version >= 6 {
            return rest;
        }
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(Value::String(admin_passwd.to_string()));
        args.extend(rest);
        args
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_names_v5() {
        assert_eq!(DbMethod::Create.wire_name(5), "create");
        assert_eq!(DbMethod::GetProgress.wire_name(5), "get_progress");
        assert_eq!(DbMethod::Drop.wire_name(5), "drop");
    }

    #[test]
    fn test_wire_names_v6_and_later() {
        assert_eq!(DbMethod::Create.wire_name(6), "exp_create");
        assert_eq!(DbMethod::GetProgress.wire_name(6), "exp_get_progress");
        assert_eq!(DbMethod::Drop.wire_name(7), "exp_drop");
    }

    #[test]
    fn test_wire_args_v5_prepends_password() {
        let args = DbMethod::Create.wire_args(5, "swordfish", vec![json!("demo_db"), json!(false)]);
        assert_eq!(args, vec![json!("swordfish"), json!("demo_db"), json!(false)]);
    }

    #[test]
    fn test_wire_args_v6_drops_password() {
        let args = DbMethod::Drop.wire_args(6, "swordfish", vec![json!("demo_db")]);
        assert_eq!(args, vec![json!("demo_db")]);
    }
}
