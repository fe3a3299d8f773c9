//! In-process substrate: ranks are threads connected by `std::sync::mpsc`

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};

use crate::comm::{Channel, Comm, Message};
use crate::errors::CommError;

/// One rank's endpoints: a sender to every rank and a receiver from every
/// rank, per channel
pub struct LocalComm {
    rank: usize,
    outgoing: Vec<[Sender<Message>; 2]>,
    incoming: Vec<[Receiver<Message>; 2]>,
}

/// Build `size` fully connected ranks; element `i` is rank `i`
pub fn world(size: usize) -> Vec<LocalComm> {
    // links[dest][source][channel]
    let mut senders: Vec<Vec<[Sender<Message>; 2]>> = Vec::with_capacity(size);
    let mut receivers: Vec<Vec<[Receiver<Message>; 2]>> = Vec::with_capacity(size);
    for _dest in 0..size {
        let mut to_dest = Vec::with_capacity(size);
        let mut at_dest = Vec::with_capacity(size);
        for _source in 0..size {
            let (main_tx, main_rx) = channel();
            let (control_tx, control_rx) = channel();
            to_dest.push([main_tx, control_tx]);
            at_dest.push([main_rx, control_rx]);
        }
        senders.push(to_dest);
        receivers.push(at_dest);
    }

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, incoming)| LocalComm {
            rank,
            outgoing: senders.iter().map(|to_dest| to_dest[rank].clone()).collect(),
            incoming,
        })
        .collect()
}

impl LocalComm {
    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        if rank >= self.incoming.len() {
            return Err(CommError::UnknownRank {
                rank,
                size: self.incoming.len(),
            });
        }
        Ok(())
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.incoming.len()
    }

    fn send(&self, dest: usize, channel: Channel, message: Message) -> Result<(), CommError> {
        self.check_rank(dest)?;
        self.outgoing[dest][channel.index()]
            .send(message)
            .map_err(|_| CommError::Disconnected(dest))
    }

    fn try_recv(&self, source: usize, channel: Channel) -> Result<Option<Message>, CommError> {
        self.check_rank(source)?;
        match self.incoming[source][channel.index()].try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(CommError::Disconnected(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_are_independent() {
        let ranks = world(3);
        ranks[0].send(2, Channel::Main, Message::Value(1.5)).unwrap();
        ranks[0].send(2, Channel::Control, Message::Shutdown).unwrap();
        ranks[1].send(2, Channel::Main, Message::Count(4)).unwrap();

        assert_eq!(ranks[2].try_recv(0, Channel::Control).unwrap(), Some(Message::Shutdown));
        assert_eq!(ranks[2].try_recv(0, Channel::Control).unwrap(), None);
        assert_eq!(ranks[2].try_recv(1, Channel::Main).unwrap(), Some(Message::Count(4)));
        assert_eq!(ranks[2].try_recv(0, Channel::Main).unwrap(), Some(Message::Value(1.5)));
        assert_eq!(ranks[1].try_recv(0, Channel::Main).unwrap(), None);
        assert_eq!(ranks[2].size(), 3);
        assert_eq!(ranks[2].rank(), 2);
    }

    #[test]
    fn test_order_and_disconnect() {
        let mut ranks = world(2);
        let worker = ranks.pop().unwrap();
        for i in 0..3 {
            worker.send(0, Channel::Main, Message::Value(i as f64)).unwrap();
        }
        drop(worker);
        let coordinator = &ranks[0];
        for i in 0..3 {
            assert_eq!(
                coordinator.try_recv(1, Channel::Main).unwrap(),
                Some(Message::Value(i as f64))
            );
        }
        assert_eq!(
            coordinator.try_recv(1, Channel::Main),
            Err(CommError::Disconnected(1))
        );
        assert_eq!(
            coordinator.send(1, Channel::Main, Message::Shutdown),
            Err(CommError::Disconnected(1))
        );
        assert!(matches!(
            coordinator.send(5, Channel::Main, Message::Shutdown),
            Err(CommError::UnknownRank { rank: 5, size: 2 })
        ));
    }
}
