/**
 * HEARTH PLUGINS/COMMS - Unité d'écoute des commandes
 *
 * Reçoit les datagrammes du port de commande et les passe au routeur
 * partagé. Le POST /control emprunte le même routeur sans passer par ici.
 */

use crate::config::Config;
use crate::context::Context;
use crate::lifecycle::{PluginTask, Worker, WorkerCtl};
use crate::net::{self, UdpChannel};
use crate::plugins::Plugin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct CommandsPlugin {
    worker: Worker,
    enabled: bool,
    task: Option<Arc<ListenTask>>,
}

struct ListenTask {
    ctx: Arc<Context>,
    channel: UdpChannel,
}

impl PluginTask for ListenTask {
    fn run_iteration(&self, _ctl: &WorkerCtl) -> anyhow::Result<()> {
        if let Some(msg) = self.channel.recv() {
            self.ctx.router().dispatch(&msg);
        }
        Ok(())
    }
}

pub fn factory(ctx: Arc<Context>, cfg: &Config) -> Arc<dyn Plugin> {
    let worker = Worker::new("commands");
    let enabled = cfg.enabled("commands");
    if !enabled {
        return Arc::new(CommandsPlugin {
            worker,
            enabled,
            task: None,
        });
    }

    let port = cfg.get_u64_or("commands", "command_port", net::COMMAND_PORT as u64) as u16;
    let channel = match UdpChannel::bind(ctx.multicast_group(), port, Duration::from_secs(1)) {
        Ok(channel) => channel,
        Err(e) => {
            warn!(port, "port de commande indisponible: {e}");
            return Arc::new(CommandsPlugin {
                worker,
                enabled,
                task: None,
            });
        }
    };

    info!(port, "écoute des commandes prête");
    worker.mark_initialized();
    Arc::new(CommandsPlugin {
        worker,
        enabled,
        task: Some(Arc::new(ListenTask { ctx, channel })),
    })
}

impl Plugin for CommandsPlugin {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_initialized(&self) -> bool {
        self.worker.is_initialized()
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(self: Arc<Self>) {
        if let Some(task) = &self.task {
            self.worker.start(task.clone());
        }
    }

    fn stop(&self) {
        self.worker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, UdpSocket};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> Arc<Context> {
        Arc::new(Context::new(&Config::empty()).unwrap())
    }

    #[test]
    fn missing_section_leaves_unit_disabled_and_uninitialized() {
        let plugin = factory(context(), &Config::empty());
        assert!(!plugin.is_enabled());
        assert!(!plugin.is_initialized());
        plugin.clone().start();
        assert!(!plugin.is_running());
    }

    #[test]
    fn factory_initializes_on_an_ephemeral_port() {
        let cfg = Config::from_str("commands:\n  command_port: 0\n").unwrap();
        let plugin = factory(context(), &cfg);
        assert!(plugin.is_enabled());
        assert!(plugin.is_initialized());
    }

    #[test]
    fn datagram_reaches_registered_callback() {
        let ctx = context();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        ctx.router().register("alarm", move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        let channel =
            UdpChannel::bind(ctx.multicast_group(), 0, Duration::from_millis(100)).unwrap();
        let port = channel.local_port();
        let worker = Worker::new("commands");
        worker.mark_initialized();
        worker.start(Arc::new(ListenTask { ctx, channel }));

        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        sender
            .send_to(b"alarm,arm", (Ipv4Addr::LOCALHOST, port))
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while hits.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        worker.stop();
    }
}
