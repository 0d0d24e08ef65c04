//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All handles are **waitable** but non-blocking; the collectives call
//! `.wait()` before they trust that a buffer is ready. Messages between the
//! same pair of ranks with the same tag are delivered in send order.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Typed message tag. Protocol stages that need two tags use
/// [`CommTag::offset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(tag: u16) -> Self {
        CommTag(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    pub const fn offset(self, by: u16) -> Self {
        CommTag(self.0.wrapping_add(by))
    }
}

/// Non-blocking communication interface.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive for the next message from `peer` with `tag`; the
    /// message length is taken from the message itself.
    fn irecv(&self, peer: usize, tag: u16) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank communicator; every collective short-circuits to the local
/// rank, so it never actually moves a message.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16) {}
}

// --- RayonComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = Arc<DashMap<Key, VecDeque<Bytes>>>;

/// Ranks running as threads of one process, sharing a mailbox.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Mailbox,
}

impl RayonComm {
    /// `size` communicators sharing one mailbox; hand one to each thread.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox: Mailbox = Arc::new(DashMap::new());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

pub struct LocalRecv {
    key: Key,
    mailbox: Mailbox,
}

impl Wait for LocalRecv {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    return Some(bytes.to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16) -> LocalRecv {
        LocalRecv {
            key: (peer, self.rank, tag),
            mailbox: Arc::clone(&self.mailbox),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::rc::Rc;

    /// Communicator over an MPI communicator.
    pub struct MpiComm {
        world: Rc<SimpleCommunicator>,
        rank: usize,
        size: usize,
        _universe: Option<Universe>,
    }

    impl MpiComm {
        /// Initialise MPI and wrap `MPI_COMM_WORLD`. Returns `None` if MPI
        /// was already initialised.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let mut comm = Self::from_communicator(world);
            comm._universe = Some(universe);
            Some(comm)
        }

        /// Wrap an existing communicator (for example a per-grid subgroup).
        pub fn from_communicator(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self {
                world: Rc::new(world),
                rank,
                size,
                _universe: None,
            }
        }
    }

    pub struct MpiSend {
        request: Option<Request<'static, [u8], StaticScope>>,
        buf: *mut [u8],
    }

    impl Wait for MpiSend {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(request) = self.request.take() {
                request.wait();
            }
            // SAFETY: `buf` came from `Box::leak` in `isend` and the request
            // borrowing it has completed.
            drop(unsafe { Box::from_raw(self.buf) });
            None
        }
    }

    pub struct MpiRecv {
        world: Rc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
    }

    impl Wait for MpiRecv {
        fn wait(self) -> Option<Vec<u8>> {
            let (data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSend;
        type RecvHandle = MpiRecv;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSend {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = leaked;
            // SAFETY: the buffer stays alive until `MpiSend::wait` reclaims it.
            let data: &'static [u8] = unsafe { &*ptr };
            let request = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                data,
                i32::from(tag),
            );
            MpiSend {
                request: Some(request),
                buf: ptr,
            }
        }

        fn irecv(&self, peer: usize, tag: u16) -> MpiRecv {
            MpiRecv {
                world: Rc::clone(&self.world),
                peer: peer as i32,
                tag: i32::from(tag),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rayon_roundtrip_two_ranks() {
        let world = RayonComm::world(2);
        let (comm0, comm1) = (&world[0], &world[1]);

        let recv_handle = comm1.irecv(0, 7);
        comm0.isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle
            .wait()
            .expect("Expected to receive data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn same_tag_messages_arrive_in_order() {
        let world = RayonComm::world(2);
        world[0].isend(1, 3, &[1]);
        world[0].isend(1, 3, &[2]);
        assert_eq!(world[1].irecv(0, 3).wait(), Some(vec![1]));
        assert_eq!(world[1].irecv(0, 3).wait(), Some(vec![2]));
    }

    #[test]
    fn worlds_do_not_share_mailboxes() {
        let a = RayonComm::world(2);
        let b = RayonComm::world(2);
        a[0].isend(1, 1, &[9]);
        b[0].isend(1, 1, &[8]);
        assert_eq!(b[1].irecv(0, 1).wait(), Some(vec![8]));
        assert_eq!(a[1].irecv(0, 1).wait(), Some(vec![9]));
    }

    #[test]
    fn no_comm_is_single_rank() {
        let c = NoComm;
        assert_eq!((c.rank(), c.size()), (0, 1));
        assert_eq!(c.irecv(0, 0).wait(), None);
    }
}
