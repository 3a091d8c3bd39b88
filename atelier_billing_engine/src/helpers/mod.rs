use rand::Rng;

pub const COUPON_CODE_LEN: usize = 8;
const COUPON_CODE_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random coupon code. Uniqueness is enforced by the database; callers retry on collision.
pub fn generate_coupon_code() -> String {
    let mut rng = rand::thread_rng();
    (0..COUPON_CODE_LEN)
        .map(|_| {
            let i = rng.gen_range(0..COUPON_CODE_CHARSET.len());
            COUPON_CODE_CHARSET[i] as char
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes_have_the_expected_shape() {
        for _ in 0..100 {
            let code = generate_coupon_code();
            assert_eq!(code.len(), COUPON_CODE_LEN);
            assert!(code.bytes().all(|b| COUPON_CODE_CHARSET.contains(&b)));
        }
    }
}
