//! WireGuard key material
//!
//! Uses x25519-dalek for key generation; nothing here touches a shell.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

/// WireGuard key pair, base64-encoded
#[derive(Debug, Clone)]
pub struct Keypair {
    pub private_key: String,
    pub public_key: String,
}

/// Key-generation capability consumed by the provisioner
pub trait KeyProvider: Send + Sync {
    fn generate_keypair(&self) -> Keypair;
    fn generate_preshared_key(&self) -> String;
}

/// Native x25519 key provider
pub struct X25519KeyProvider;

impl KeyProvider for X25519KeyProvider {
    fn generate_keypair(&self) -> Keypair {
        let mut private_key_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut private_key_bytes);

        // WireGuard key clamping
        private_key_bytes[0] &= 248;
        private_key_bytes[31] &= 127;
        private_key_bytes[31] |= 64;

        let secret = StaticSecret::from(private_key_bytes);
        let public = PublicKey::from(&secret);

        Keypair {
            private_key: STANDARD.encode(private_key_bytes),
            public_key: STANDARD.encode(public.as_bytes()),
        }
    }

    fn generate_preshared_key(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }
}
