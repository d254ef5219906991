use std::thread;

use tracing_subscriber::EnvFilter;

use remora::{misc, search, tb, threads, tt, uci, ucioption};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    println!("{}", misc::engine_info(false));

    ucioption::init();
    search::init();
    tt::resize(ucioption::get_i32("Hash") as usize);
    threads::init(ucioption::get_i32("Threads") as usize);
    tb::init(&ucioption::get_string("SyzygyPath"));
    search::clear();

    let builder = thread::Builder::new().stack_size(16 * 1024 * 1024);
    let ui_thread = builder.spawn(uci::cmd_loop).expect("failed to spawn UI thread");
    let _ = ui_thread.join();

    threads::free();
}
