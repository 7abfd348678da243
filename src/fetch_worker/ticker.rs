use async_channel::Sender;
use async_std::task::{self, JoinHandle};
use log::*;
use std::time::Duration;

use super::handler::Command;

/// Spawns the timer that feeds `Command::Tick` into a worker's mailbox.
///
/// The first tick is sent one full interval after the start.  The task stops on
/// its own once the mailbox is closed; the handler cancels it when it exits.
pub fn spawn_ticker(interval: Duration, tx: Sender<Command>) -> JoinHandle<()> {
    task::spawn(async move {
        debug!("ticker started, interval: {:?}", interval);

        loop {
            task::sleep(interval).await;

            if tx.send(Command::Tick).await.is_err() {
                debug!("mailbox closed, ticker exit");
                break;
            }
        }
    })
}
