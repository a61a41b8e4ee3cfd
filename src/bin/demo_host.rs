// Demo host: maps an anonymous shared region, registers one queue, and
// publishes a counter payload while running the liveness pass. A client in
// another process can attach via the fd printed at startup
// (/proc/<pid>/fd/<fd>).

#[cfg(target_os = "linux")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use shmbus::sys::region::MemfdRegion;
    use shmbus::Host;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    let args: Vec<String> = std::env::args().collect();
    let region_size: usize = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1024 * 1024);
    let queue_len: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(16);

    let mut mapping = MemfdRegion::create(region_size, "shmbus_demo")?;
    println!(
        "Demo host: mapped {} bytes, fd {} (attach via /proc/{}/fd/{})",
        mapping.size(),
        mapping.raw_fd(),
        std::process::id(),
        mapping.raw_fd()
    );

    let mut host = Host::init(mapping.region())?;
    println!("Demo host: session {:08x}", host.session_id());

    let queue = host.add_queue(1, queue_len)?;
    let mut payload = host.mem_alloc(64)?;
    println!(
        "Demo host: queue registered ({queue_len}+1 slots), {} bytes of region left",
        host.mem_available()
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })?;

    let mut counter: u64 = 0;
    let mut published: u64 = 0;
    while running.load(Ordering::SeqCst) {
        payload.write(&counter.to_le_bytes())?;
        match host.post(queue, counter as u32, &payload) {
            Ok(()) => published += 1,
            Err(shmbus::Error::QueueFull) => {}
            Err(e) => return Err(e.into()),
        }
        counter += 1;

        host.process()?;
        std::thread::sleep(Duration::from_millis(5));
    }

    println!(
        "Demo host: exiting after {} posts, heartbeat {}",
        published,
        host.heartbeat()
    );
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("demo_host needs the Linux memfd region provider");
    std::process::exit(1);
}
