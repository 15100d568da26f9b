/// Identity written into lease rows so replicas can tell each other apart.
///
/// `INSTANCE_ID` wins when set; container runtimes and login shells export
/// `HOSTNAME`, which covers the usual deployment. A bare fallback keeps
/// single-replica setups working without any environment at all.
pub fn instance_id() -> String {
    if let Ok(v) = std::env::var("INSTANCE_ID") {
        if !v.is_empty() {
            return v;
        }
    }
    if let Ok(v) = std::env::var("HOSTNAME") {
        if !v.is_empty() {
            return v;
        }
    }
    "standalone".to_string()
}
