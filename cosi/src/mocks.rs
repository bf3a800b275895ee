use crate::{
    bls::{PrivateKey, PublicKey},
    roster::{Identity, Roster},
};
use commonware_cryptography::{PrivateKeyExt as _, Signer as _};
use commonware_p2p::simulated::{Config, Link, Network, Oracle, Receiver, Sender};
use commonware_runtime::{deterministic, Metrics};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Sending and receiving half of a registered peer.
pub type Channel = (Sender<PublicKey>, Receiver<PublicKey>);

pub fn address(index: u32) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000 + index as u16)
}

/// Deterministic keys and a roster over them (in seed order).
pub fn participants(n: u32) -> (Vec<PrivateKey>, Roster) {
    let privates: Vec<_> = (0..n as u64).map(PrivateKey::from_seed).collect();
    let identities = privates
        .iter()
        .enumerate()
        .map(|(i, private)| Identity {
            public_key: private.public_key(),
            address: address(i as u32),
        })
        .collect();
    (privates, Roster::new(identities).unwrap())
}

/// A link with 10ms latency that delivers messages with probability `success_rate`.
pub fn link(success_rate: f64) -> Link {
    Link {
        latency: 10.0,
        jitter: 1.0,
        success_rate,
    }
}

/// Start a simulated network and register `peers` on it, linking every pair in both directions.
///
/// Channels are returned in the order of `peers`.
pub async fn network(
    context: &deterministic::Context,
    peers: &[PublicKey],
    link: Link,
) -> (Oracle<PublicKey>, Vec<Channel>) {
    let (network, mut oracle) = Network::new(
        context.with_label("network"),
        Config {
            max_size: 1024 * 1024,
        },
    );
    network.start();

    let mut channels = Vec::with_capacity(peers.len());
    for peer in peers {
        channels.push(oracle.register(peer.clone(), 0).await.unwrap());
    }
    for from in peers {
        for to in peers {
            if from == to {
                continue;
            }
            oracle
                .add_link(from.clone(), to.clone(), link.clone())
                .await
                .unwrap();
        }
    }
    (oracle, channels)
}
