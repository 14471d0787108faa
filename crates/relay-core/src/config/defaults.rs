pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_name() -> String {
    "wa-relay".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.wa-relay".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_timezone() -> String {
    "Africa/Casablanca".to_string()
}
pub(super) fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
pub(super) fn default_api_port() -> u16 {
    3000
}
pub(super) fn default_bridge_url() -> String {
    "http://127.0.0.1:3001".to_string()
}
pub(super) fn default_jid_suffix() -> String {
    "c.us".to_string()
}
pub(super) fn default_request_timeout() -> u64 {
    60
}
pub(super) fn default_secret_header() -> String {
    "x-api-key".to_string()
}
pub(super) fn default_log_file() -> String {
    "data/send_logs.json".to_string()
}
pub(super) fn default_max_logs() -> usize {
    5000
}
pub(super) fn default_inter_send_delay() -> u64 {
    1000
}
pub(super) fn default_send_at() -> String {
    "08:00".to_string()
}
pub(super) fn default_poll_interval() -> u64 {
    30
}
pub(super) fn default_since_days() -> i64 {
    30
}
pub(super) fn default_limit_per_chat() -> usize {
    50
}
pub(super) fn default_max_chats() -> usize {
    200
}
