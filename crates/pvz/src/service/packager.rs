use rust_decimal::Decimal;
use shared::errors::ServiceError;
use shared::model::{PackageType, WrapperType};

/// Base packaging variant: a weight ceiling (if any) plus a surcharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasePackager {
    Bag,
    Box,
    Film,
}

impl BasePackager {
    fn max_weight(&self) -> Option<Decimal> {
        match self {
            BasePackager::Bag => Some(Decimal::from(10)),
            BasePackager::Box => Some(Decimal::from(30)),
            BasePackager::Film => None,
        }
    }

    fn surcharge(&self) -> Decimal {
        match self {
            BasePackager::Bag => Decimal::from(5),
            BasePackager::Box => Decimal::from(20),
            BasePackager::Film => Decimal::from(1),
        }
    }
}

/// Packaging is either a base variant or the same base wrapped in film; the
/// wrapper stacks its own surcharge and re-runs the base weight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packager {
    Base(BasePackager),
    Wrapped {
        base: BasePackager,
        wrapper: WrapperType,
    },
}

impl Packager {
    pub fn build(base: PackageType, wrapper: Option<WrapperType>) -> Self {
        let base = match base {
            PackageType::Bag => BasePackager::Bag,
            PackageType::Box => BasePackager::Box,
            PackageType::Film => BasePackager::Film,
        };

        match wrapper {
            Some(wrapper) => Packager::Wrapped { base, wrapper },
            None => Packager::Base(base),
        }
    }

    fn base(&self) -> BasePackager {
        match self {
            Packager::Base(base) => *base,
            Packager::Wrapped { base, .. } => *base,
        }
    }

    pub fn validate_weight(&self, weight: Decimal) -> Result<(), ServiceError> {
        if let Some(max) = self.base().max_weight()
            && weight > max
        {
            return Err(ServiceError::PackageWeightExceeded { weight, max });
        }
        Ok(())
    }

    pub fn additional_cost(&self) -> Decimal {
        let wrapper_surcharge = match self {
            Packager::Base(_) => Decimal::ZERO,
            Packager::Wrapped { wrapper, .. } => match wrapper {
                WrapperType::Film => Decimal::from(1),
            },
        };

        self.base().surcharge() + wrapper_surcharge
    }
}
