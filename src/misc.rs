pub const ENGINE_NAME: &str = "Remora";
pub const ENGINE_VERSION: &str = "0.9.0";
pub const ENGINE_AUTHOR: &str = "the Remora developers";

pub fn engine_info(to_uci: bool) -> String {
    if to_uci {
        format!("{} {}\nid author {}", ENGINE_NAME, ENGINE_VERSION, ENGINE_AUTHOR)
    } else {
        format!("{} {} by {}", ENGINE_NAME, ENGINE_VERSION, ENGINE_AUTHOR)
    }
}
