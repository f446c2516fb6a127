use crate::common::Map;
use crate::common::error::{NodeSpecError, QuantityViolation};
use crate::resources::{
    CPU_RESOURCE_NAME, GPU_RESOURCE_NAME, MEMORY_RESOURCE_NAME, OBJECT_STORE_MEMORY_RESOURCE_NAME,
    ResourceSpec,
};

impl ResourceSpec {
    /// Flattens a resolved spec into the resource map handed to the scheduler.
    ///
    /// Zero quantities are left out. Panics if `self` is not resolved.
    pub fn to_resource_map(&self, max_quantity: f64) -> crate::Result<Map<String, f64>> {
        let (
            Some(num_cpus),
            Some(num_gpus),
            Some(memory),
            Some(object_store_memory),
            Some(resources),
            Some(_),
        ) = (
            self.num_cpus,
            self.num_gpus,
            self.memory,
            self.object_store_memory,
            &self.resources,
            self.redis_max_memory,
        )
        else {
            panic!("Resource spec has to be resolved before it is converted to a map: {self:?}");
        };

        let mut map = resources.clone();
        map.insert(CPU_RESOURCE_NAME.to_string(), num_cpus);
        map.insert(GPU_RESOURCE_NAME.to_string(), num_gpus);
        map.insert(MEMORY_RESOURCE_NAME.to_string(), memory as f64);
        map.insert(
            OBJECT_STORE_MEMORY_RESOURCE_NAME.to_string(),
            object_store_memory as f64,
        );
        map.retain(|_, quantity| *quantity != 0.0);

        for (name, quantity) in &map {
            check_quantity(name, *quantity, max_quantity)?;
        }
        Ok(map)
    }
}

fn check_quantity(name: &str, value: f64, max_quantity: f64) -> crate::Result<()> {
    let violation = if value.fract() != 0.0 {
        QuantityViolation::NotWholeNumber
    } else if value < 0.0 {
        QuantityViolation::Negative
    } else if value > max_quantity {
        QuantityViolation::ExceedsMaximum(max_quantity)
    } else {
        return Ok(());
    };
    Err(NodeSpecError::InvalidResourceQuantity {
        name: name.to_string(),
        value,
        violation,
    })
}

#[cfg(test)]
mod tests {
    use crate::Map;
    use crate::common::error::{NodeSpecError, QuantityViolation};
    use crate::config::MAX_RESOURCE_QUANTITY;
    use crate::resources::ResourceSpec;
    use crate::tests::utils::resources;

    fn resolved(custom: &[(&str, f64)]) -> ResourceSpec {
        ResourceSpec {
            num_cpus: Some(4.0),
            num_gpus: Some(0.0),
            memory: Some(7_000_000_000),
            object_store_memory: Some(3_000_000_000),
            resources: Some(resources(custom)),
            redis_max_memory: Some(1_000_000_000),
        }
    }

    fn violation(spec: &ResourceSpec) -> QuantityViolation {
        match spec.to_resource_map(MAX_RESOURCE_QUANTITY) {
            Err(NodeSpecError::InvalidResourceQuantity { violation, .. }) => violation,
            other => panic!("Unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_to_resource_map() {
        let map = resolved(&[("node:10.0.0.1", 1.0), ("custom", 5.0)])
            .to_resource_map(MAX_RESOURCE_QUANTITY)
            .unwrap();
        assert_eq!(
            map,
            Map::from([
                ("CPU".to_string(), 4.0),
                ("custom".to_string(), 5.0),
                ("memory".to_string(), 7_000_000_000.0),
                ("node:10.0.0.1".to_string(), 1.0),
                ("object_store_memory".to_string(), 3_000_000_000.0),
            ])
        );
    }

    #[test]
    fn test_zero_quantities_are_dropped() {
        let map = resolved(&[("empty", 0.0), ("negative_zero", -0.0)])
            .to_resource_map(MAX_RESOURCE_QUANTITY)
            .unwrap();
        assert!(!map.contains_key("GPU"));
        assert!(!map.contains_key("empty"));
        assert!(!map.contains_key("negative_zero"));
        assert!(map.values().all(|v| *v != 0.0));
    }

    #[test]
    fn test_fractional_quantity() {
        assert_eq!(
            violation(&resolved(&[("custom", 0.5)])),
            QuantityViolation::NotWholeNumber
        );
        assert_eq!(
            violation(&resolved(&[("custom", -1.5)])),
            QuantityViolation::NotWholeNumber
        );
        assert_eq!(
            violation(&resolved(&[("custom", f64::NAN)])),
            QuantityViolation::NotWholeNumber
        );
        let spec = ResourceSpec {
            num_cpus: Some(1.5),
            ..resolved(&[])
        };
        let error = spec.to_resource_map(MAX_RESOURCE_QUANTITY).unwrap_err();
        insta::assert_snapshot!(error.to_string(), @"Resource quantities must all be whole numbers. Violated by resource 'CPU' (1.5).");
    }

    #[test]
    fn test_negative_quantity() {
        let spec = resolved(&[("custom", -2.0)]);
        assert_eq!(violation(&spec), QuantityViolation::Negative);
        let error = spec.to_resource_map(MAX_RESOURCE_QUANTITY).unwrap_err();
        insta::assert_snapshot!(error.to_string(), @"Resource quantities must be nonnegative. Violated by resource 'custom' (-2).");
    }

    #[test]
    fn test_quantity_over_maximum() {
        let spec = resolved(&[("custom", 200e12)]);
        assert_eq!(
            violation(&spec),
            QuantityViolation::ExceedsMaximum(MAX_RESOURCE_QUANTITY)
        );
        let error = spec.to_resource_map(MAX_RESOURCE_QUANTITY).unwrap_err();
        insta::assert_snapshot!(error.to_string(), @"Resource quantities must be at most 100000000000000. Violated by resource 'custom' (200000000000000).");

        // The maximum itself is allowed
        assert!(
            resolved(&[("custom", MAX_RESOURCE_QUANTITY)])
                .to_resource_map(MAX_RESOURCE_QUANTITY)
                .is_ok()
        );
    }

    #[test]
    fn test_configured_maximum() {
        let spec = resolved(&[]);
        assert!(matches!(
            spec.to_resource_map(1000.0),
            Err(NodeSpecError::InvalidResourceQuantity { ref name, .. }) if name == "memory"
        ));
    }

    #[test]
    #[should_panic(expected = "has to be resolved")]
    fn test_unresolved_spec_panics() {
        let _ = ResourceSpec::default().to_resource_map(MAX_RESOURCE_QUANTITY);
    }
}
