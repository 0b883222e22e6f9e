use clap::{App, Arg, ArgMatches, SubCommand};
use hubqueue::{
    create_local_queue, usage, BackingType, BrokerConfig, ClientApi, Fence, PixelFormat,
    QueryKey, QueueBufferInput, QueueConfig, QueueError, Rect, Result,
};
use std::{path::PathBuf, sync::Arc, thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("hubqueue-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Hubqueue buffer queue CLI Tool")
        .arg(
            Arg::with_name("file_dir")
                .long("file-dir")
                .value_name("DIR")
                .help("Back buffers with files in DIR instead of memfd")
                .global(true)
                .takes_value(true),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Circulate frames between a producer and a consumer thread")
                .arg(
                    Arg::with_name("frames")
                        .short("n")
                        .long("frames")
                        .value_name("COUNT")
                        .help("Number of frames to queue")
                        .default_value("100")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("buffers")
                        .short("b")
                        .long("buffers")
                        .value_name("COUNT")
                        .help("Slot table size")
                        .default_value("3")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("width")
                        .long("width")
                        .value_name("PIXELS")
                        .help("Buffer width")
                        .default_value("640")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("height")
                        .long("height")
                        .value_name("PIXELS")
                        .help("Buffer height")
                        .default_value("480")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("realloc")
                .about("Show buffers being reallocated when the requested size changes")
                .arg(
                    Arg::with_name("sizes")
                        .short("s")
                        .long("sizes")
                        .value_name("WxH,...")
                        .help("Comma separated list of sizes to dequeue in order")
                        .default_value("64x64,128x128,128x128,64x64")
                        .takes_value(true),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show queue defaults"))
        .get_matches();

    let file_dir = matches.value_of("file_dir").map(PathBuf::from);

    match matches.subcommand() {
        ("run", Some(sub_matches)) => handle_run(sub_matches, file_dir),
        ("realloc", Some(sub_matches)) => handle_realloc(sub_matches, file_dir),
        ("info", Some(_)) => handle_info(file_dir),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    matches
        .value_of(name)
        .ok_or_else(|| QueueError::invalid_argument(name, "missing value"))?
        .parse()
        .map_err(|_| QueueError::invalid_argument(name, "invalid number"))
}

fn broker_config(name: &str, capacity: usize, file_dir: Option<PathBuf>) -> BrokerConfig {
    let config = BrokerConfig::new(name).with_capacity(capacity);
    match file_dir {
        Some(dir) => config
            .with_backing_type(BackingType::FileBacked)
            .with_file_dir(dir),
        None => config,
    }
}

fn handle_run(matches: &ArgMatches, file_dir: Option<PathBuf>) -> Result<()> {
    let frames: u64 = parse_arg(matches, "frames")?;
    let buffers: usize = parse_arg(matches, "buffers")?;
    let width: u32 = parse_arg(matches, "width")?;
    let height: u32 = parse_arg(matches, "height")?;

    println!(
        "Circulating {} frames of {}x{} through {} buffers...",
        frames, width, height, buffers
    );

    let (producer, broker) = create_local_queue(
        QueueConfig::new("cli-run")
            .with_max_buffer_count(buffers)
            .with_max_dequeued_buffer_count(buffers.saturating_sub(1).max(1))
            .with_dequeue_timeout(Duration::from_millis(500)),
        broker_config("cli-run", buffers, file_dir),
    )?;
    producer.connect(ClientApi::Cpu)?;

    let consumer_broker = Arc::clone(&broker);
    let consumer = thread::spawn(move || -> Result<u64> {
        let mut consumed = 0;
        while consumed < frames {
            let Some(acquired) = consumer_broker.acquire(Duration::from_secs(1))? else {
                break;
            };
            consumed += 1;
            consumer_broker.release(acquired.slot, Fence::no_fence())?;
        }
        Ok(consumed)
    });

    let start = std::time::Instant::now();
    for frame in 0..frames {
        let dequeued = producer.dequeue(width, height, PixelFormat::Rgba8888, usage::DEFAULT)?;
        let buffer = producer.request(dequeued.slot)?;

        let stamp = frame.to_le_bytes();
        if buffer.memory().size() >= stamp.len() {
            // SAFETY: the slot is dequeued, so the consumer cannot read it
            unsafe {
                std::ptr::copy_nonoverlapping(
                    stamp.as_ptr(),
                    buffer.memory().as_mut_ptr_unsafe(),
                    stamp.len(),
                );
            }
        }

        let input = QueueBufferInput::new(frame as i64, Fence::no_fence())
            .with_crop(Rect::from_size(width, height));
        producer.queue(dequeued.slot, &input)?;
    }

    let consumed = consumer
        .join()
        .map_err(|_| QueueError::invariant("consumer thread panicked"))??;
    let elapsed = start.elapsed();

    println!("\nResults:");
    println!("  Frames consumed: {}", consumed);
    println!("  Total time: {:.2}ms", elapsed.as_millis());
    println!("  Frames/sec: {:.0}", consumed as f64 / elapsed.as_secs_f64());
    println!("  {}", producer.stats().summary());
    println!("  Broker allocations: {}", broker.stats().buffers_allocated);

    producer.disconnect(ClientApi::Cpu)?;
    Ok(())
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let invalid = || QueueError::invalid_argument("sizes", format!("'{}' is not WxH", size));
    let (width, height) = size.trim().split_once('x').ok_or_else(invalid)?;
    Ok((
        width.parse().map_err(|_| invalid())?,
        height.parse().map_err(|_| invalid())?,
    ))
}

fn handle_realloc(matches: &ArgMatches, file_dir: Option<PathBuf>) -> Result<()> {
    let sizes = matches
        .value_of("sizes")
        .ok_or_else(|| QueueError::invalid_argument("sizes", "missing value"))?
        .split(',')
        .map(parse_size)
        .collect::<Result<Vec<_>>>()?;

    let (producer, broker) = create_local_queue(
        QueueConfig::new("cli-realloc").with_max_buffer_count(2),
        broker_config("cli-realloc", 2, file_dir),
    )?;
    producer.connect(ClientApi::Cpu)?;

    for (width, height) in sizes {
        let dequeued = producer.dequeue(width, height, PixelFormat::Rgba8888, usage::DEFAULT)?;
        let view = producer.slot(dequeued.slot)?;
        println!(
            "dequeue {}x{} -> slot {} buffer {:?} needs_reallocation={}",
            width, height, dequeued.slot, view.buffer_id, dequeued.needs_reallocation
        );
        producer.cancel(dequeued.slot, Some(Fence::no_fence()))?;
    }

    let stats = broker.stats();
    println!("\nBroker: {} allocations, {} detaches", stats.buffers_allocated, stats.buffers_detached);
    println!("{}", producer.stats().summary());
    Ok(())
}

fn handle_info(file_dir: Option<PathBuf>) -> Result<()> {
    let capacity = hubqueue::config::MAX_QUEUE_CAPACITY;
    let (producer, _broker) = create_local_queue(
        QueueConfig::default(),
        broker_config("cli-info", capacity, file_dir),
    )?;

    println!("Hubqueue v{}", hubqueue::VERSION);
    println!("  Max queue capacity: {}", capacity);
    println!("  Default dequeue timeout: {:?}", hubqueue::config::DEFAULT_DEQUEUE_TIMEOUT);
    println!("  Default width: {}", producer.query(QueryKey::Width)?);
    println!("  Default height: {}", producer.query(QueryKey::Height)?);
    let format = producer.query(QueryKey::Format)?;
    println!(
        "  Default format: {}",
        PixelFormat::from_raw(format).map_or("unknown", PixelFormat::name)
    );
    println!("  Page size: {} bytes", hubqueue::memory::page_size());
    println!("  Unique id: {:#x}", producer.unique_id());
    Ok(())
}
