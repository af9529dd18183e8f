//! CSPRNG based on OpenSSL.

use dkm_common::crypto;

/// [`crypto::Rng`] implementation based on OpenSSL.
#[derive(Default)]
pub struct OsslRng;

impl crypto::Rng for OsslRng {
    fn add_entropy(&mut self, data: &[u8]) {
        unsafe {
            // Safety: `data` is a valid slice.  An entropy estimate of zero
            // mixes the data in without crediting the pool.
            openssl_sys::RAND_add(
                data.as_ptr() as *const libc::c_void,
                data.len() as libc::c_int,
                0.0,
            );
        }
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        openssl::rand::rand_bytes(dest).unwrap(); // safe: RAND_bytes() does not fail
    }
}
