//! The VMware hypervisor backdoor as an escape transport.
//!
//! Messages travel over the guest RPC ("RPCI") protocol: the guest opens an RPC
//! channel, sends `log <text>` four bytes at a time and drains the reply. The
//! host appends the text to `vmware.log`.
//!
//! The backdoor I/O port is usable from any privilege level inside a VMware
//! VM, including processes that cannot use any other host communication. On
//! bare metal or another hypervisor, touching it raises #GP, so presence is
//! checked with CPUID before the port is ever used.

use core::arch::asm;

use spin::Mutex;

use super::transport::{EscapeBuffer, EscapeError, EscapeToken, EscapeTransport, InitError};

const BDOOR_MAGIC: u32 = 0x564d_5868;
const BDOOR_PORT: u16 = 0x5658;
const BDOOR_CMD_MESSAGE: u32 = 0x1e;

const MESSAGE_TYPE_OPEN: u32 = 0;
const MESSAGE_TYPE_SEND_SIZE: u32 = 1;
const MESSAGE_TYPE_SEND_PAYLOAD: u32 = 2;
const MESSAGE_TYPE_RECV_SIZE: u32 = 3;
const MESSAGE_TYPE_RECV_PAYLOAD: u32 = 4;
const MESSAGE_TYPE_RECV_STATUS: u32 = 5;
const MESSAGE_TYPE_CLOSE: u32 = 6;

const MESSAGE_STATUS_SUCCESS: u32 = 0x0001;
const MESSAGE_STATUS_DO_RECV: u32 = 0x0002;

const RPCI_PROTOCOL: u32 = 0x4943_5052;
const GUEST_MESSAGE_FLAG_COOKIE: u32 = 0x8000_0000;

const LOG_COMMAND: &[u8] = b"log ";

const HV_CPUID_VENDOR_AND_MAX_FUNCTIONS: u32 = 0x4000_0000;
const VMWARE_VENDOR_NAME_EBX: u32 = u32::from_ne_bytes(*b"VMwa");
const VMWARE_VENDOR_NAME_ECX: u32 = u32::from_ne_bytes(*b"reVM");
const VMWARE_VENDOR_NAME_EDX: u32 = u32::from_ne_bytes(*b"ware");

/// Tests whether the current system runs on VMware.
pub fn is_vmware_present() -> bool {
    // See: CPUID Fn0000_0001_ECX[31], reserved for use by hypervisors.
    if x86::cpuid::cpuid!(0x1).ecx & (1 << 31) == 0 {
        return false;
    }
    let regs = x86::cpuid::cpuid!(HV_CPUID_VENDOR_AND_MAX_FUNCTIONS);
    (regs.ebx == VMWARE_VENDOR_NAME_EBX)
        && (regs.ecx == VMWARE_VENDOR_NAME_ECX)
        && (regs.edx == VMWARE_VENDOR_NAME_EDX)
}

/// Forwards messages to `vmware.log` through the backdoor.
#[derive(Debug, Default)]
pub struct BackdoorTransport {
    // An RPC channel carries one exchange at a time.
    exchange: Mutex<()>,
}

impl BackdoorTransport {
    /// Creates the transport. Nothing touches the backdoor until `open`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            exchange: Mutex::new(()),
        }
    }
}

impl EscapeTransport for BackdoorTransport {
    fn open(&self) -> Result<EscapeToken, InitError> {
        if !is_vmware_present() {
            return Err(InitError::HypervisorNotPresent);
        }
        let _exchange = self.exchange.lock();
        RpcChannel::open().map(RpcChannel::into_token)
    }

    fn submit_escape(
        &self,
        token: &EscapeToken,
        buffer: &EscapeBuffer<'_>,
    ) -> Result<(), EscapeError> {
        let _exchange = self.exchange.lock();
        let channel = RpcChannel::from_token(token);
        channel.send(LOG_COMMAND, buffer.payload().as_bytes())?;
        channel.receive_reply()
    }

    fn close(&self, token: EscapeToken) {
        let _exchange = self.exchange.lock();
        let regs = RpcChannel::from_token(&token).call(MESSAGE_TYPE_CLOSE, 0);
        if !succeeded(&regs) {
            log::debug!("The host did not acknowledge closing RPC channel {}", token.handle());
        }
    }
}

/// The register file exchanged with the backdoor.
#[derive(Clone, Copy, Debug, Default)]
struct Registers {
    eax: u32,
    ebx: u32,
    ecx: u32,
    edx: u32,
    esi: u32,
    edi: u32,
}

/// Executes the backdoor call with `regs` and updates `regs` with the result.
fn backdoor(regs: &mut Registers) {
    let mut rbx = u64::from(regs.ebx);
    // RBX cannot be an operand, so swap it with a scratch register around IN.
    unsafe {
        asm!(
            "xchg rbx, {bx}",
            "in eax, dx",
            "xchg rbx, {bx}",
            bx = inout(reg) rbx,
            inout("eax") regs.eax,
            inout("ecx") regs.ecx,
            inout("edx") regs.edx,
            inout("esi") regs.esi,
            inout("edi") regs.edi,
            options(nostack),
        );
    }
    regs.ebx = rbx as u32;
}

fn succeeded(regs: &Registers) -> bool {
    (regs.ecx >> 16) & MESSAGE_STATUS_SUCCESS != 0
}

/// An open RPC channel: its id and the two cookie words guarding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RpcChannel {
    id: u16,
    cookie_high: u32,
    cookie_low: u32,
}

impl RpcChannel {
    fn open() -> Result<Self, InitError> {
        let mut regs = Registers {
            eax: BDOOR_MAGIC,
            ebx: RPCI_PROTOCOL | GUEST_MESSAGE_FLAG_COOKIE,
            ecx: (MESSAGE_TYPE_OPEN << 16) | BDOOR_CMD_MESSAGE,
            edx: u32::from(BDOOR_PORT),
            ..Default::default()
        };
        backdoor(&mut regs);
        if !succeeded(&regs) {
            return Err(InitError::ChannelRefused);
        }
        Ok(Self {
            id: (regs.edx >> 16) as u16,
            cookie_high: regs.esi,
            cookie_low: regs.edi,
        })
    }

    fn into_token(self) -> EscapeToken {
        let cookie = (u64::from(self.cookie_high) << 32) | u64::from(self.cookie_low);
        EscapeToken::new(u64::from(self.id), cookie)
    }

    fn from_token(token: &EscapeToken) -> Self {
        Self {
            id: token.handle() as u16,
            cookie_high: (token.cookie() >> 32) as u32,
            cookie_low: token.cookie() as u32,
        }
    }

    fn call(self, message_type: u32, ebx: u32) -> Registers {
        let mut regs = Registers {
            eax: BDOOR_MAGIC,
            ebx,
            ecx: (message_type << 16) | BDOOR_CMD_MESSAGE,
            edx: (u32::from(self.id) << 16) | u32::from(BDOOR_PORT),
            esi: self.cookie_high,
            edi: self.cookie_low,
        };
        backdoor(&mut regs);
        regs
    }

    fn send(self, command: &[u8], payload: &[u8]) -> Result<(), EscapeError> {
        let size = u32::try_from(command.len() + payload.len())
            .map_err(|_| EscapeError::Rejected { step: "send-size" })?;
        if !succeeded(&self.call(MESSAGE_TYPE_SEND_SIZE, size)) {
            return Err(EscapeError::Rejected { step: "send-size" });
        }
        let bytes = command.iter().chain(payload).copied();
        for word in pack_words(bytes) {
            if !succeeded(&self.call(MESSAGE_TYPE_SEND_PAYLOAD, word)) {
                return Err(EscapeError::Rejected {
                    step: "send-payload",
                });
            }
        }
        Ok(())
    }

    // The reply has to be consumed before the channel accepts the next message.
    fn receive_reply(self) -> Result<(), EscapeError> {
        let regs = self.call(MESSAGE_TYPE_RECV_SIZE, 0);
        if !succeeded(&regs) {
            return Err(EscapeError::Rejected {
                step: "receive-size",
            });
        }
        if (regs.ecx >> 16) & MESSAGE_STATUS_DO_RECV == 0 {
            return Ok(());
        }

        let mut first_word = [0u8; 4];
        for index in 0..regs.ebx.div_ceil(4) {
            let regs = self.call(MESSAGE_TYPE_RECV_PAYLOAD, MESSAGE_STATUS_SUCCESS);
            if !succeeded(&regs) {
                return Err(EscapeError::Rejected {
                    step: "receive-payload",
                });
            }
            if index == 0 {
                first_word = regs.ebx.to_le_bytes();
            }
        }
        if !succeeded(&self.call(MESSAGE_TYPE_RECV_STATUS, MESSAGE_STATUS_SUCCESS)) {
            return Err(EscapeError::Rejected {
                step: "receive-status",
            });
        }

        // Replies start with "1 " on success and "0 " on failure.
        if first_word[0] == b'1' {
            Ok(())
        } else {
            Err(EscapeError::Rejected { step: "reply" })
        }
    }
}

/// Packs `bytes` into little endian words, padding the last one with zeros.
fn pack_words(bytes: impl Iterator<Item = u8>) -> impl Iterator<Item = u32> {
    let mut bytes = bytes.peekable();
    core::iter::from_fn(move || {
        let _ = bytes.peek()?;
        let mut word = [0u8; 4];
        for (slot, byte) in word.iter_mut().zip(&mut bytes) {
            *slot = byte;
        }
        Some(u32::from_le_bytes(word))
    })
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;

    use super::*;

    #[test]
    fn packs_words() {
        let bytes = LOG_COMMAND.iter().chain(b"hi").copied();
        let words: Vec<u32> = pack_words(bytes).collect();
        assert_eq!(
            words,
            [
                u32::from_le_bytes(*b"log "),
                u32::from_le_bytes([b'h', b'i', 0, 0])
            ]
        );
    }

    #[test]
    fn packs_nothing() {
        assert_eq!(pack_words(core::iter::empty()).count(), 0);
    }

    #[test]
    fn token_round_trip_keeps_cookies() {
        let channel = RpcChannel {
            id: 3,
            cookie_high: 0xdead_beef,
            cookie_low: 0x1234_5678,
        };
        let token = channel.into_token();
        assert_eq!(token.handle(), 3);
        assert_eq!(token.cookie(), 0xdead_beef_1234_5678);
        assert_eq!(RpcChannel::from_token(&token), channel);
    }

    #[test]
    fn vendor_name() {
        let mut name = [0u8; 12];
        name[..4].copy_from_slice(&VMWARE_VENDOR_NAME_EBX.to_ne_bytes());
        name[4..8].copy_from_slice(&VMWARE_VENDOR_NAME_ECX.to_ne_bytes());
        name[8..].copy_from_slice(&VMWARE_VENDOR_NAME_EDX.to_ne_bytes());
        assert_eq!(&name, b"VMwareVMware");
    }
}
