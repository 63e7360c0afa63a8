//! Key-space helpers for the `(appname, queuename)`-scoped namespaces
//! described in spec.md §3.

pub fn inc_key() -> &'static str {
    "AX:INC"
}

pub fn inc_field(appname: &str, queuename: &str) -> String {
    format!("{}:{}", appname, queuename)
}

pub fn meta_key(appname: &str, queuename: &str, id: u64) -> String {
    format!("AX:META:{}:{}:{}", appname, queuename, id)
}

pub fn uuid_index_key(appname: &str, queuename: &str) -> String {
    format!("AX:UUID:{}:{}", appname, queuename)
}

pub fn cname_key(appname: &str, queuename: &str, cname: &str) -> String {
    format!("AX:CNAME:{}:{}:{}", appname, queuename, cname)
}

pub fn schedule_index_key(appname: &str, queuename: &str) -> String {
    format!("AX:SC:{}:{}", appname, queuename)
}
