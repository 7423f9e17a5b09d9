#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use ccm_core::handler::RetryThenAbort;
use ccm_core::{AtResources, Sequencer};
use ccm_firmware::board;
use ccm_firmware::secrets;
use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info, warn};
use static_cell::StaticCell;

const BANNER: &str = "******************AIROC™ CCM MQTT HELLO WORLD******************";

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

async fn idle() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "the config and the sequencer future live on main's stack"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("{}", BANNER);

    let config = match secrets::config() {
        Ok(config) => config,
        Err(e) => {
            error!("Bad build-time config: {}", e);
            idle().await
        }
    };

    let uart = board::ccm_uart(peripherals.UART1, peripherals.GPIO17, peripherals.GPIO18);
    let (rx, tx) = match uart {
        Ok(halves) => halves,
        Err(e) => {
            error!("UART init failed: {:?}", e);
            idle().await
        }
    };

    static AT_RESOURCES: StaticCell<AtResources> = StaticCell::new();
    let resources = AT_RESOURCES.init_with(AtResources::new);
    let (ingress, client) = resources.split(rx, tx, config.ping_host.clone());

    let handler = RetryThenAbort::new(secrets::CONNECT_RETRIES);
    let mut sequencer = Sequencer::new(client, Delay, handler, &config);

    match ingress.run_with(sequencer.run()).await {
        Ok(report) if report.published => info!(
            "Hello world published ({:?} flow, {} connect attempt(s))",
            report.flow, report.connect_attempts
        ),
        Ok(report) => warn!(
            "Sequence finished but the module did not confirm the publish ({:?} flow)",
            report.flow
        ),
        Err(e) => error!("Onboarding failed: {}", e),
    }

    idle().await
}
