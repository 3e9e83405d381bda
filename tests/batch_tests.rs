//! Tests for batched dequeue and exclusive enqueue

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use poolbridge::{
        BridgeConfig, BufferMain, BufferMainConfigBuilder, HandleId, IovaMode, NoDevices,
        ObjectRef, PoolBridge, PoolBridgeError, PoolVariant, BATCH_SIZE, EXT_HEADER_SIZE,
    };

    const CACHED: HandleId = HandleId::new(0, PoolVariant::Cached);
    const NON_CACHED: HandleId = HandleId::new(0, PoolVariant::NonCached);

    fn bridge(partitions: &[(&str, u32)]) -> PoolBridge {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut builder = BufferMainConfigBuilder::new().ext_header_size(EXT_HEADER_SIZE);
        for &(name, count) in partitions {
            builder = builder.partition(name, count);
        }
        let bm = Arc::new(BufferMain::new(builder.build().unwrap()).unwrap());
        PoolBridge::new(bm, BridgeConfig::new().with_iova_mode(IovaMode::Va), &NoDevices).unwrap()
    }

    fn available(bridge: &PoolBridge, tag: u8) -> usize {
        bridge.partition(tag).unwrap().available()
    }

    #[test]
    fn test_second_dequeue_fails_without_consuming() {
        let bridge = bridge(&[("default", 8)]);

        let mut first = [ObjectRef::NULL; 5];
        bridge.dequeue(CACHED, &mut first).unwrap();
        assert_eq!(available(&bridge, 0), 3);

        let mut second = [ObjectRef::NULL; 5];
        let err = bridge.dequeue(CACHED, &mut second).unwrap_err();
        assert!(err.is_shortfall());
        assert!(matches!(
            err,
            PoolBridgeError::AllocationShortfall {
                partition: 0,
                requested: 5
            }
        ));
        assert_eq!(available(&bridge, 0), 3);

        let stats = bridge.stats(0).unwrap();
        assert_eq!(stats.dequeued, 5);
        assert_eq!(stats.dequeue_failures, 1);
        assert_eq!(stats.rolled_back, 3);
    }

    #[test]
    fn test_dequeue_full_and_partial_batch() {
        let bridge = bridge(&[("default", 40)]);
        let cached = bridge.cached(0).unwrap();
        let known: HashSet<ObjectRef> = cached.elements().iter().copied().collect();

        let mut objs = vec![ObjectRef::NULL; 40];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        assert_eq!(available(&bridge, 0), 0);

        let distinct: HashSet<ObjectRef> = objs.iter().copied().collect();
        assert_eq!(distinct.len(), 40);
        assert!(distinct.iter().all(|obj| known.contains(obj)));
        assert!(objs.iter().all(|obj| !obj.is_null()));
    }

    #[test]
    fn test_failure_in_later_batch_rolls_back_earlier_batches() {
        let bridge = bridge(&[("default", 40)]);

        let mut objs = vec![ObjectRef::NULL; BATCH_SIZE + 20];
        assert!(bridge.dequeue(CACHED, &mut objs).is_err());
        assert_eq!(available(&bridge, 0), 40);
        assert_eq!(bridge.stats(0).unwrap().rolled_back, 40);

        // Everything is still there to hand out
        let mut all = vec![ObjectRef::NULL; 40];
        bridge.dequeue(CACHED, &mut all).unwrap();
    }

    #[test]
    fn test_empty_requests_are_noops() {
        let bridge = bridge(&[("default", 4)]);

        bridge.dequeue(CACHED, &mut []).unwrap();
        bridge.enqueue(CACHED, &[]).unwrap();
        assert_eq!(available(&bridge, 0), 4);
        assert_eq!(bridge.stats(0).unwrap().dequeue_failures, 0);
    }

    #[test]
    fn test_round_trip_restores_template() {
        let bridge = bridge(&[("default", 70)]);
        let partition = bridge.partition(0).unwrap();

        let mut objs = vec![ObjectRef::NULL; 70];
        bridge.dequeue(CACHED, &mut objs).unwrap();

        for &obj in &objs {
            let header = bridge.buffer_header(0, obj).unwrap();
            assert!(partition.template().matches(header));
        }

        // Scribble on the templated fields the way a datapath would
        let view = bridge.objects(0).unwrap();
        for &obj in &objs {
            let bi = view.index_of(obj).unwrap();
            // SAFETY: the test holds every dequeued buffer exclusively
            let header = unsafe { view.buffer_header_mut(bi) }.unwrap();
            header.current_data = -14;
            header.current_length = 60;
            header.flags = 0x5;
            header.next_buffer = 3;
        }

        bridge.enqueue(CACHED, &objs).unwrap();
        assert_eq!(available(&bridge, 0), 70);

        for &obj in &objs {
            let header = bridge.buffer_header(0, obj).unwrap();
            assert!(partition.template().matches(header));
        }

        let stats = bridge.stats(0).unwrap();
        assert_eq!(stats.dequeued, 70);
        assert_eq!(stats.enqueued, 70);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_enqueue_with_foreign_object_releases_nothing() {
        let bridge = bridge(&[("default", 64)]);
        let partition = bridge.partition(0).unwrap();

        let mut objs = vec![ObjectRef::NULL; 40];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        assert_eq!(available(&bridge, 0), 24);

        let view = bridge.objects(0).unwrap();
        for &obj in &objs {
            let bi = view.index_of(obj).unwrap();
            // SAFETY: the test holds every dequeued buffer exclusively
            unsafe { view.buffer_header_mut(bi) }.unwrap().current_length = 60;
        }

        // The bad object sits in the second free-list chunk
        let good = objs[35];
        objs[35] = ObjectRef::from_address(0x40);
        let err = bridge.enqueue(CACHED, &objs).unwrap_err();
        assert!(matches!(err, PoolBridgeError::InvalidObject { partition: 0, address: 0x40 }));

        assert_eq!(available(&bridge, 0), 24);
        for &obj in objs.iter().filter(|obj| obj.address() != 0x40) {
            let header = bridge.buffer_header(0, obj).unwrap();
            assert_eq!(header.current_length, 60);
            assert!(!partition.template().matches(header));
        }
        assert_eq!(bridge.stats(0).unwrap().enqueued, 0);

        objs[35] = good;
        bridge.enqueue(CACHED, &objs).unwrap();
        assert_eq!(available(&bridge, 0), 64);
        assert_eq!(bridge.stats(0).unwrap().enqueued, 40);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "released while shared")]
    fn test_exclusive_release_of_shared_buffer_panics() {
        let bridge = bridge(&[("default", 8)]);

        let mut objs = [ObjectRef::NULL; 1];
        bridge.dequeue(CACHED, &mut objs).unwrap();
        bridge.buffer_header(0, objs[0]).unwrap().add_ref(1);

        let _ = bridge.enqueue(CACHED, &objs);
    }

    #[test]
    fn test_partitions_are_independent() {
        let bridge = bridge(&[("a", 8), ("b", 8)]);
        let b_cached = HandleId::new(1, PoolVariant::Cached);

        let mut objs = [ObjectRef::NULL; 8];
        bridge.dequeue(b_cached, &mut objs).unwrap();
        assert_eq!(available(&bridge, 0), 8);
        assert_eq!(available(&bridge, 1), 0);

        // Objects of partition 1 are not objects of partition 0
        assert!(matches!(
            bridge.enqueue(CACHED, &objs),
            Err(PoolBridgeError::InvalidObject { partition: 0, .. })
        ));
        bridge.enqueue(b_cached, &objs).unwrap();
        assert_eq!(available(&bridge, 1), 8);
    }

    #[test]
    fn test_non_cached_dequeue_unsupported() {
        let bridge = bridge(&[("default", 8)]);

        let mut objs = [ObjectRef::NULL; 2];
        let err = bridge.dequeue(NON_CACHED, &mut objs).unwrap_err();
        assert!(matches!(
            err,
            PoolBridgeError::UnsupportedOperation {
                operation: "dequeue",
                ..
            }
        ));
        assert_eq!(available(&bridge, 0), 8);
    }

    #[test]
    fn test_unknown_handle() {
        let bridge = bridge(&[("default", 8)]);
        let mut objs = [ObjectRef::NULL; 1];
        assert!(matches!(
            bridge.dequeue(HandleId::new(9, PoolVariant::Cached), &mut objs),
            Err(PoolBridgeError::UnknownPool { index: 9 })
        ));
    }

    #[test]
    fn test_engine_handle_dispatch() {
        let bridge = bridge(&[("default", 16)]);
        let cached = bridge.cached(0).unwrap();

        let mut objs = [ObjectRef::NULL; 16];
        cached.dequeue_bulk(&bridge, &mut objs).unwrap();
        assert_eq!(available(&bridge, 0), 0);
        cached.enqueue_bulk(&bridge, &objs).unwrap();
        assert_eq!(available(&bridge, 0), 16);
    }
}
