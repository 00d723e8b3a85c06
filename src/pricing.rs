// src/pricing.rs

use crate::models::Cart;

/// Stały koszt dostawy znany po stronie klienta (serwer go nie zwraca).
/// Wartość jedzie z kasy do potwierdzenia jako stan przejściowy nawigacji.
pub const SHIPPING_FEE: i64 = 160;

/// Rozbicie cen liczone z jednego zrzutu koszyka. Widok koszyka i
/// podsumowanie kasy wołają dokładnie tę samą funkcję, więc nigdy nie
/// pokażą różnych kwot dla tego samego koszyka.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingBreakdown {
    pub subtotal: f64,
    pub discount: f64,
    pub shipping: i64,
    pub total: i64,
}

/// Czysta funkcja wyceny. Rabat to zawsze `total - final_total` z serwera
/// (klient nie zna i nie liczy formuły rabatu); ujemny rabat jest ucinany
/// do zera zgodnie z niezmiennikiem `final_total <= total`.
pub fn derive_pricing(cart: &Cart, shipping_fee: i64) -> PricingBreakdown {
    PricingBreakdown {
        subtotal: cart.total,
        discount: (cart.total - cart.final_total).max(0.0),
        shipping: shipping_fee,
        total: charged_total(cart.final_total, shipping_fee),
    }
}

/// Kwota do zapłaty: sufit do pełnej złotówki. Zaokrąglamy zawsze w górę,
/// bo ułamkowy rabat nie może obniżyć kwoty poniżej tego, co sugeruje
/// wyświetlana pełna kwota. Ta sama reguła obowiązuje na potwierdzeniu
/// zamówienia (tam z zapisanego `order.total` zamiast żywego koszyka).
pub fn charged_total(final_amount: f64, shipping_fee: i64) -> i64 {
    (final_amount + shipping_fee as f64).ceil() as i64
}

/// Format kwoty ułamkowej, np. "1234,50 zł".
pub fn format_price(amount: f64) -> String {
    format!("{:.2}", amount).replace('.', ",") + " zł"
}

/// Format kwoty pełnozłotowej, np. "960 zł".
pub fn format_price_whole(amount: i64) -> String {
    format!("{} zł", amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart(total: f64, final_total: f64) -> Cart {
        Cart {
            lines: Vec::new(),
            total,
            final_total,
        }
    }

    #[test]
    fn scenario_subtotal_1000_final_800_fee_160() {
        let pricing = derive_pricing(&cart(1000.0, 800.0), 160);
        assert_eq!(pricing.subtotal, 1000.0);
        assert_eq!(pricing.discount, 200.0);
        assert_eq!(pricing.shipping, 160);
        assert_eq!(pricing.total, 960);
    }

    #[test]
    fn fractional_discount_rounds_total_up() {
        // Kupon procentowy potrafi zostawić końcówkę groszową;
        // kwota do zapłaty idzie w górę do pełnej złotówki.
        let pricing = derive_pricing(&cart(1000.0, 833.34), 160);
        assert_eq!(pricing.total, 994);
    }

    #[test]
    fn discount_is_never_negative() {
        let pricing = derive_pricing(&cart(500.0, 500.5), 160);
        assert_eq!(pricing.discount, 0.0);
    }

    #[test]
    fn no_coupon_means_zero_discount() {
        let pricing = derive_pricing(&cart(750.0, 750.0), SHIPPING_FEE);
        assert_eq!(pricing.discount, 0.0);
        assert_eq!(pricing.total, 910);
    }

    #[test]
    fn charged_total_matches_derive_pricing() {
        let c = cart(1299.0, 974.25);
        assert_eq!(
            derive_pricing(&c, SHIPPING_FEE).total,
            charged_total(c.final_total, SHIPPING_FEE)
        );
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price(1234.5), "1234,50 zł");
        assert_eq!(format_price_whole(960), "960 zł");
    }
}
