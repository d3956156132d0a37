use std::{
    io::{self, Read, Write},
    os::unix::{
        fs::{FileTypeExt, PermissionsExt},
        io::AsRawFd,
        net::{UnixListener, UnixStream},
    },
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use nix::{
    sys::socket::{getsockopt, sockopt::PeerCredentials},
    unistd::Pid,
};
use platform::Host;

use crate::{
    dispatcher::Dispatcher,
    protocol::{encode_reply, FrameHeader, FRAME_HEADER_SIZE},
    status::{Completion, Status},
};

/// A Unix socket through which callers reach the dispatcher.
///
/// The socket file exists for as long as the endpoint does.
#[derive(Debug)]
pub struct Endpoint {
    listener: UnixListener,
    path: PathBuf,
    max_frame: u32,
}

impl Endpoint {
    pub fn register<P: Into<PathBuf>>(path: P, mode: u32, max_frame: u32) -> anyhow::Result<Self> {
        let path = path.into();
        if !path.is_absolute() {
            bail!("socket path {:?} is not absolute", path);
        }
        if let Ok(meta) = std::fs::symlink_metadata(&path) {
            if !meta.file_type().is_socket() {
                bail!("{:?} exists and is not a socket", path);
            }
            match UnixStream::connect(&path) {
                Ok(_) => bail!("{:?} is in use by a running server", path),
                Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to connect to existing socket {:?}", path));
                }
            }
            logger::debug!("removing stale socket {:?}", path);
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to remove stale socket {:?}", path))?;
        }
        let listener =
            UnixListener::bind(&path).with_context(|| format!("failed to bind {:?}", path))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("failed to set mode {:o} on {:?}", mode, path))?;
        logger::info!("listening on {:?}", path);
        Ok(Self {
            listener,
            path,
            max_frame,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections forever, one thread per connection.
    pub fn serve<H: Host + 'static>(&self, dispatcher: Arc<Dispatcher<H>>) -> anyhow::Result<()> {
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    logger::warn!("accept failed: {}", err);
                    continue;
                }
            };
            let dispatcher = Arc::clone(&dispatcher);
            let max_frame = self.max_frame;
            std::thread::spawn(move || {
                if let Err(err) = serve_connection(stream, &dispatcher, max_frame) {
                    logger::warn!("connection closed with error: {:#}", err);
                }
            });
        }
        Ok(())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            logger::warn!("failed to remove {:?}: {}", self.path, err);
        }
    }
}

fn peer_pid(stream: &UnixStream) -> anyhow::Result<Pid> {
    let cred = getsockopt(stream.as_raw_fd(), PeerCredentials)
        .context("failed to read peer credentials")?;
    Ok(Pid::from_raw(cred.pid()))
}

fn serve_connection<H: Host>(
    mut stream: UnixStream,
    dispatcher: &Dispatcher<H>,
    max_frame: u32,
) -> anyhow::Result<()> {
    let caller = peer_pid(&stream)?;
    logger::debug!("connection opened by {}", caller);
    loop {
        let mut raw = [0u8; FRAME_HEADER_SIZE];
        match stream.read_exact(&mut raw) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                logger::debug!("connection closed by {}", caller);
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to read frame header"),
        }
        let header = FrameHeader::decode(&raw);

        let completion = if header.length > max_frame {
            let skipped = io::copy(
                &mut (&mut stream).take(u64::from(header.length)),
                &mut io::sink(),
            )
            .context("failed to drain oversized frame")?;
            logger::warn!("{}: dropped frame of {} bytes", caller, skipped);
            Completion::failure(Status::LengthMismatch)
        } else {
            let mut payload = vec![0u8; header.length as usize];
            stream
                .read_exact(&mut payload)
                .context("failed to read frame payload")?;
            let input = if payload.is_empty() {
                None
            } else {
                Some(payload.as_slice())
            };
            dispatcher.handle(caller, header.opcode, input)
        };
        stream
            .write_all(&encode_reply(&completion))
            .context("failed to write reply")?;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        os::unix::net::UnixStream,
        time::Duration,
    };

    use mem::Addr;
    use nix::unistd::getpid;
    use platform::LinuxHost;
    use rand::Rng;

    use super::*;
    use crate::{
        client::Client,
        protocol::{decode_reply, OP_COPY_MEMORY, REPLY_SIZE},
    };

    fn start(max_frame: u32) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.sock");
        let endpoint = Endpoint::register(&path, 0o600, max_frame).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(LinuxHost::new(4096)));
        std::thread::spawn(move || endpoint.serve(dispatcher));
        (dir, path)
    }

    fn self_id() -> u32 {
        getpid().as_raw() as u32
    }

    #[test]
    fn register_sets_mode_and_unregisters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mode.sock");
        {
            let endpoint = Endpoint::register(&path, 0o640, 64).unwrap();
            let mode = std::fs::metadata(endpoint.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o640);
        }
        assert!(!path.exists());
    }

    #[test]
    fn register_refuses_relative_or_regular_paths() {
        assert!(Endpoint::register("relative.sock", 0o600, 64).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain");
        std::fs::write(&path, b"not a socket").unwrap();
        assert!(Endpoint::register(&path, 0o600, 64).is_err());
        assert!(path.exists());
    }

    #[test]
    fn register_replaces_only_stale_sockets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let endpoint = Endpoint::register(&path, 0o600, 64).unwrap();
        let err = Endpoint::register(&path, 0o600, 64).unwrap_err();
        assert!(err.to_string().contains("in use"));
        assert!(UnixStream::connect(endpoint.path()).is_ok());
    }

    #[test]
    fn write_then_read_round_trip() {
        let (_dir, path) = start(4096);
        let mut client = Client::connect(&path).unwrap();
        let mut rng = rand::thread_rng();

        for size in [1usize, 7, 4096, 3 * 4096 + 5, 1 << 20] {
            let mut payload = vec![0u8; size];
            rng.fill(&mut payload[..]);
            let mut remote = vec![0u8; size];
            let remote_addr = Addr(remote.as_mut_ptr() as u64);

            let written = client.write(self_id(), remote_addr, &payload).unwrap();
            assert_eq!(written, Completion::success(29));
            assert_eq!(remote, payload);

            let mut back = vec![0u8; size];
            let read = client.read(self_id(), remote_addr, &mut back).unwrap();
            assert_eq!(read, Completion::success(29));
            assert_eq!(back, payload);
        }
    }

    #[test]
    fn failures_come_back_as_status() {
        let (_dir, path) = start(4096);
        let mut client = Client::connect(&path).unwrap();

        let mut buf = [0u8; 16];
        let unmapped = client.read(self_id(), Addr(0), &mut buf).unwrap();
        assert_eq!(unmapped, Completion::failure(Status::AccessDenied));

        let missing = client.read(u32::MAX, Addr(0x1000), &mut buf).unwrap();
        assert_eq!(missing, Completion::failure(Status::ProcessNotFound));

        let short = client.call(OP_COPY_MEMORY, &[0u8; 28]).unwrap();
        assert_eq!(short, Completion::failure(Status::LengthMismatch));

        let empty = client.call(OP_COPY_MEMORY, &[]).unwrap();
        assert_eq!(empty, Completion::failure(Status::LengthMismatch));

        let unknown = client.call(0x1234, &[0u8; 29]).unwrap();
        assert_eq!(unknown, Completion::failure(Status::InvalidOperation));
    }

    #[test]
    fn oversized_frame_is_drained() {
        let (_dir, path) = start(64);
        let mut stream = UnixStream::connect(&path).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();

        let header = FrameHeader {
            opcode: OP_COPY_MEMORY,
            length: 1000,
        };
        stream.write_all(&header.encode()).unwrap();
        stream.write_all(&[0u8; 1000]).unwrap();
        let mut reply = [0u8; REPLY_SIZE];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(
            decode_reply(&reply),
            Some(Completion::failure(Status::LengthMismatch))
        );

        // the stream stays usable after the oversized frame
        let header = FrameHeader {
            opcode: 0,
            length: 0,
        };
        stream.write_all(&header.encode()).unwrap();
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(
            decode_reply(&reply),
            Some(Completion::failure(Status::InvalidOperation))
        );
    }

    #[test]
    fn concurrent_clients() {
        let (_dir, path) = start(4096);
        let handles = (0..8u8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut client = Client::connect(&path).unwrap();
                    let source = vec![i; 512];
                    let mut back = vec![0u8; 512];
                    let read = client
                        .read(self_id(), Addr(source.as_ptr() as u64), &mut back)
                        .unwrap();
                    (read, back == source)
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), (Completion::success(29), true));
        }
    }
}
